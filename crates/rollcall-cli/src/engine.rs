use crate::service::{Attendance, AttendanceReport, ServiceError};
use rollcall_core::{EmbeddingProvider, FaceProgress};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from the front end to the engine thread.
enum EngineRequest {
    Enroll {
        name: String,
        roll: String,
        image: PathBuf,
        replace: bool,
        reply: oneshot::Sender<Result<PathBuf, ServiceError>>,
    },
    MarkAttendance {
        image: PathBuf,
        progress: mpsc::UnboundedSender<FaceProgress>,
        reply: oneshot::Sender<Result<AttendanceReport, ServiceError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll a student from a single-face photo. Returns the stored reference path.
    pub async fn enroll(
        &self,
        name: String,
        roll: String,
        image: PathBuf,
        replace: bool,
    ) -> Result<PathBuf, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                name,
                roll,
                image,
                replace,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Mark attendance from a class photo.
    ///
    /// One [`FaceProgress`] is sent on `progress` after each face is scored;
    /// the sender is dropped when the run ends.
    pub async fn mark_attendance(
        &self,
        image: PathBuf,
        progress: mpsc::UnboundedSender<FaceProgress>,
    ) -> Result<AttendanceReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::MarkAttendance {
                image,
                progress,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Move `attendance` onto a dedicated OS thread and serve requests one at a time.
///
/// Model loading happens before this call, so a missing model fails fast on
/// the caller's thread. The thread exits once every handle is dropped.
pub fn spawn_engine<P>(mut attendance: Attendance<P>) -> Result<EngineHandle, EngineError>
where
    P: EmbeddingProvider + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::debug!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        name,
                        roll,
                        image,
                        replace,
                        reply,
                    } => {
                        let result = attendance.enroll(&name, &roll, &image, replace);
                        let _ = reply.send(result);
                    }
                    EngineRequest::MarkAttendance {
                        image,
                        progress,
                        reply,
                    } => {
                        let result = attendance.mark_attendance(&image, |p| {
                            // Receiver gone means nobody is watching; keep going.
                            let _ = progress.send(p.clone());
                        });
                        drop(progress);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::debug!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
