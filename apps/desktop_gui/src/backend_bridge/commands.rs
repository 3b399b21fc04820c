//! Backend commands queued from UI to backend worker.

use shared::domain::EditType;
use std::path::PathBuf;

pub enum BackendCommand {
    /// Validate and load an image; both the picker and the drop zone funnel
    /// through this single command.
    SelectImage {
        path: PathBuf,
    },
    ClearSelection,
    Submit {
        edit_type: EditType,
    },
    CancelSubmission,
    CheckHealth,
}
