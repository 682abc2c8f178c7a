//! # Pull Progress Events
//!
//! A one-way, fire-and-forget stream of named stage events for the UI's
//! sync dialog. Not a cancellation mechanism: dropping the receiver just
//! silences the stream.

use apothek_core::EntityKind;
use tokio::sync::mpsc;

/// Stages of a pull, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStage {
    /// Requesting the batch from the cloud.
    Downloading,
    /// Batch received, preparing to merge.
    Processing,
    /// Merging one entity type's records.
    Applying(EntityKind),
    /// Batch applied and watermark advanced.
    Complete,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStage::Downloading => f.write_str("downloading"),
            SyncStage::Processing => f.write_str("processing"),
            SyncStage::Applying(kind) => write!(f, "syncing {kind}"),
            SyncStage::Complete => f.write_str("complete"),
        }
    }
}

/// Sender half handed to the pull synchronizer.
pub type ProgressSender = mpsc::UnboundedSender<SyncStage>;

/// Creates a progress channel pair.
pub fn progress_channel() -> (ProgressSender, mpsc::UnboundedReceiver<SyncStage>) {
    mpsc::unbounded_channel()
}

/// Emits a stage if anyone is listening; a closed receiver is not an error.
pub(crate) fn emit(progress: Option<&ProgressSender>, stage: SyncStage) {
    if let Some(sender) = progress {
        let _ = sender.send(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_names() {
        assert_eq!(SyncStage::Downloading.to_string(), "downloading");
        assert_eq!(
            SyncStage::Applying(EntityKind::Medicine).to_string(),
            "syncing MEDICINE"
        );
    }

    #[test]
    fn emit_survives_dropped_receiver() {
        let (tx, rx) = progress_channel();
        drop(rx);
        emit(Some(&tx), SyncStage::Complete);
    }
}
