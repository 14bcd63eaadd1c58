use chrono::Utc;
use color_eyre::Result;

use super::summary::{stale_time, Summary};
use crate::cli::print::{self, print_json};
use crate::cli::Ctx;
use crate::event::EventHandler;

/// Run the sync engine in the foreground, printing a summary on every
/// state change until interrupted.
pub async fn handle(ctx: Ctx) -> Result<()> {
  let stale = stale_time(&ctx);
  let Ctx {
    engine,
    mut toasts,
    json,
  } = ctx;

  let events = EventHandler::new(engine.config().sync.poll_interval());
  let mut snapshots = engine.subscribe();
  let mut engine_task = tokio::spawn(engine.run(events));

  let ctrl_c = tokio::signal::ctrl_c();
  tokio::pin!(ctrl_c);

  loop {
    tokio::select! {
      _ = &mut ctrl_c => {
        tracing::info!("interrupted");
        break;
      }
      result = &mut engine_task => {
        result??;
        break;
      }
      changed = snapshots.changed() => {
        if changed.is_err() {
          break;
        }
        let state = snapshots.borrow_and_update().clone();
        let summary = Summary::build(&state, Utc::now(), stale);
        if json {
          print_json(&summary)?;
        } else {
          println!("--- {} ---", Utc::now().format("%H:%M:%S"));
          summary.print();
        }
      }
      Some(toast) = toasts.recv() => print::toast(&toast),
    }
  }

  engine_task.abort();
  Ok(())
}
