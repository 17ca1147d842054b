pub(crate) const PROJECTS_CHANGED_EVENT: &str = "projects:changed";
pub(crate) const PROJECT_SELECTED_FILTER_EVENT: &str = "project:selectedFilter";
pub(crate) const SESSION_ADDED_EVENT: &str = "session:added";
pub(crate) const SESSION_REMOVED_EVENT: &str = "session:removed";
pub(crate) const SESSION_ACTIVATED_EVENT: &str = "session:activated";
pub(crate) const SESSION_EXITED_EVENT: &str = "session:exited";
pub(crate) const SESSION_DATA_EVENT: &str = "session:data";
/// Sent by the webview bridge after it fell behind the bus; listed sessions
/// should be redrawn from their scrollback.
pub(crate) const SESSION_RESYNC_EVENT: &str = "session:resync";
pub(crate) const GIT_STATUS_UPDATED_EVENT: &str = "git:statusUpdated";
pub(crate) const GIT_OP_COMPLETE_EVENT: &str = "git:opComplete";
pub(crate) const SERVICE_STATE_EVENT: &str = "service:state";

pub(crate) const EVENT_BUS_CAPACITY: usize = 1024;
