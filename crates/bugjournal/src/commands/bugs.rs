use anyhow::{anyhow, Result};

use super::App;
use crate::display;
use crate::filter::{filter_records, FilterState, SeverityFilter};
use crate::record::{parse_tags, BugDraft, RecordId, Severity};

/// Raw `add` arguments as typed on the command line
#[derive(Debug, Clone, Default)]
pub struct AddArgs {
  pub title: String,
  pub app_name: Option<String>,
  pub bug: String,
  pub severity: Option<Severity>,
  pub description: String,
  pub environment: String,
  pub steps: String,
  pub resolution: String,
  pub tags: Option<String>,
}

impl From<AddArgs> for BugDraft {
  fn from(args: AddArgs) -> Self {
    BugDraft {
      title: args.title,
      app_name: args.app_name,
      bug: args.bug,
      severity: args.severity.unwrap_or(Severity::Low),
      description: args.description,
      environment: args.environment,
      steps: args.steps,
      resolution: args.resolution,
      tags: args.tags.as_deref().map(parse_tags).unwrap_or_default(),
    }
  }
}

pub async fn add(app: &App, args: AddArgs) -> Result<()> {
  let id = app.bugs().create(args.into()).await?;
  bentley::success!("Bug added");
  println!("{id}");
  Ok(())
}

pub async fn list(app: &App, severity: SeverityFilter, query: Option<String>) -> Result<()> {
  let bugs = app.bugs();
  let records = bugs.list().await?;
  let filter = FilterState::new(severity, query.unwrap_or_default());
  let visible = filter_records(&records, &filter);

  if visible.is_empty() {
    if records.is_empty() {
      let name = app.require_principal()?.greeting_name().to_string();
      println!("{}", display::render_empty(&name));
    } else {
      bentley::info!("No bugs match the current filter");
    }
    return Ok(());
  }

  println!("{}", display::render_list(&visible));
  if !filter.is_unfiltered() {
    bentley::info!(&format!("Showing {} of {} bugs", visible.len(), records.len()));
  }
  Ok(())
}

pub async fn show(app: &App, id: String) -> Result<()> {
  let id = RecordId::new(id);
  let record = app.bugs().fetch(&id).await?.ok_or_else(|| anyhow!("Bug not found: {id}"))?;
  println!("{}", display::render_detail(&record));
  Ok(())
}

pub async fn delete(app: &App, id: String) -> Result<()> {
  let id = RecordId::new(id);
  app.bugs().delete(&id).await?;
  bentley::success!(&format!("Deleted {id}"));
  Ok(())
}
