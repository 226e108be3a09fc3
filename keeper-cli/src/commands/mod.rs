mod backup;
mod restore;
mod rollback;

// Backup commands
pub use backup::{run_backup, run_list_backups, run_sweep};

// Restore commands
pub use restore::run_restore;

// Deployment commands
pub use rollback::{run_record_deploy, run_rollback};
