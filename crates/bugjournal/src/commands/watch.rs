use anyhow::Result;

use super::App;
use crate::display;
use crate::filter::SeverityFilter;
use crate::view::{JournalView, NoticeLevel, ViewEvent};

/// Follow the journal live until interrupted
pub async fn handle(app: &App, severity: SeverityFilter, query: Option<String>) -> Result<()> {
  let principal = app.require_principal()?;
  let mut view = JournalView::new(app.bugs());
  view.set_severity(severity);
  view.set_query(query.unwrap_or_default());

  bentley::info!("Watching for changes (Ctrl-C to stop)");
  loop {
    tokio::select! {
      event = view.next_event() => {
        let Some(event) = event else { break };
        match event {
          ViewEvent::Records => render(&view, principal.greeting_name()),
          ViewEvent::PrincipalChanged => {
            bentley::info!("Signed-in user changed, reloading");
          }
          ViewEvent::Completed(_) => {}
        }
        for notice in view.take_notices() {
          match notice.level {
            NoticeLevel::Error => bentley::error(&notice.message),
            NoticeLevel::Success => bentley::success(&notice.message),
            NoticeLevel::Info => bentley::info(&notice.message),
          }
        }
      }
      _ = tokio::signal::ctrl_c() => break,
    }
  }
  Ok(())
}

fn render(view: &JournalView, name: &str) {
  let visible = view.visible();
  println!();
  if visible.is_empty() {
    if view.records().is_empty() {
      println!("{}", display::render_empty(name));
    } else {
      bentley::info!("No bugs match the current filter");
    }
    return;
  }
  println!("{}", display::render_list(&visible));
  bentley::info!(&format!("{} of {} bugs ({})", visible.len(), view.records().len(), view.filter().severity));
}
