use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc,
};
use std::thread;

use egui::mutex::RwLock;
use log::{error, info};

use fulldome::{CancelToken, Config};

pub enum Outcome {
    Finished(PathBuf),
    Cancelled(PathBuf),
    Failed(String),
}

/// A conversion running on its own thread while the window stays live.
pub struct Export {
    progress: Arc<AtomicU8>,
    running: Arc<AtomicBool>,
    outcome: Arc<RwLock<Option<Outcome>>>,
    cancel: CancelToken,
}

impl Export {
    pub fn start(ctx: &egui::Context, input: PathBuf, output: PathBuf, config: Config) -> Self {
        let export = Export {
            progress: Arc::new(AtomicU8::new(0)),
            running: Arc::new(AtomicBool::new(true)),
            outcome: Arc::new(RwLock::new(None)),
            cancel: CancelToken::new(),
        };

        let ctx = ctx.clone();
        let progress = Arc::clone(&export.progress);
        let running = Arc::clone(&export.running);
        let outcome = Arc::clone(&export.outcome);
        let cancel = export.cancel.clone();
        thread::spawn(move || {
            info!("export {} -> {}", input.display(), output.display());
            let mut report = |percent: u8| {
                progress.store(percent, Ordering::Relaxed);
                ctx.request_repaint();
            };
            let result = match fulldome::convert(&input, &output, &config, &mut report, &cancel) {
                Ok(()) if cancel.is_cancelled() => Outcome::Cancelled(output),
                Ok(()) => Outcome::Finished(output),
                Err(e) => {
                    error!("export failed: {e}");
                    Outcome::Failed(e.to_string())
                }
            };
            outcome.write().replace(result);
            running.store(false, Ordering::Relaxed);
            ctx.request_repaint();
        });
        export
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Result of the finished export, handed out once.
    pub fn take_outcome(&self) -> Option<Outcome> {
        self.outcome.write().take()
    }
}
