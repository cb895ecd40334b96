use anyhow::{anyhow, Result};

use super::App;
use crate::display;
use crate::record::RecordId;
use crate::suggestion::{placeholder, try_suggest};

/// Show the record's saved suggestion, or ask for a new one.
/// With `save`, a freshly generated suggestion is written onto the record.
pub async fn handle(app: &App, id: String, save: bool, refresh: bool) -> Result<()> {
  let id = RecordId::new(id);
  let bugs = app.bugs();
  let record = bugs.fetch(&id).await?.ok_or_else(|| anyhow!("Bug not found: {id}"))?;

  if let Some(saved) = record.ai_suggestion.as_deref().filter(|_| !refresh) {
    println!("{}", display::render_suggestion(Some(saved)));
    return Ok(());
  }

  bentley::info!("Asking Gemini...");
  let generator = app.suggestions()?;
  let text = match try_suggest(&generator, &record).await {
    Ok(text) => text,
    Err(error) => {
      println!("{}", display::render_suggestion(Some(&placeholder(&error))));
      if save {
        bentley::warn!("Nothing saved");
      }
      return Ok(());
    }
  };
  println!("{}", display::render_suggestion(Some(&text)));

  if save {
    match bugs.attach_suggestion(&id, &text).await {
      Ok(()) => {
        bentley::success!("Saved");
      }
      Err(error) => {
        bentley::error!("Failed to save");
        return Err(error.into());
      }
    }
  }
  Ok(())
}
