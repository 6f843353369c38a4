use std::{error::Error, sync::Arc, time};

use uuid::Uuid;

use arbiter_judge::{
  db::{Db, TaskData, TaskKind},
  judge::{exec_hack_task, exec_submission_task},
  sandbox::{DockerRuntime, Runtime},
  storage::{DirSource, Fetcher},
  ARGS, CONFIG,
};

/// Idle delay between polls of an empty queue.
const POLL_INTERVAL: time::Duration = time::Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let db = Arc::new(Db::open(&CONFIG.database_url)?);
  let runtime: Arc<dyn Runtime> = Arc::new(DockerRuntime::from_global_config());
  let fetcher = Fetcher::from_global_config(Arc::new(DirSource::from_global_config()));
  let worker = format!("worker-{}", Uuid::new_v4());

  log::info!("{} started", worker);

  loop {
    let leased = match db.pop_task(&worker)? {
      Some(leased) => leased,
      None => {
        if ARGS.oneshot {
          return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        continue;
      }
    };

    let task = TaskData::new(db.clone(), leased.id, &worker);
    let res = match leased.kind {
      TaskKind::Submission | TaskKind::Rejudge => {
        exec_submission_task(db.clone(), runtime.clone(), &fetcher, task, leased.payload).await
      }
      TaskKind::Hack => {
        exec_hack_task(db.clone(), runtime.clone(), &fetcher, task, leased.payload).await
      }
    };

    match res {
      Ok(()) => db.complete_task(leased.id)?,
      Err(err) if err.is_canceled() => {
        // Another worker holds the lease now; leave the task alone.
        log::warn!("lease lost on task {}", leased.id);
      }
      Err(err) => {
        log::error!("task {} failed: {}", leased.id, err);
        db.abandon_task(leased.id)?;
      }
    }

    if ARGS.oneshot {
      return Ok(());
    }
  }
}
