mod search;
mod timer;

pub use search::*;
pub use timer::*;

/// Remote models the client touches, in one place so backends and the record
/// service never drift apart on spelling.
pub mod models {
    pub const TIMESHEET: &str = "account.analytic.line";
    pub const TASK: &str = "project.task";
    pub const TICKET: &str = "helpdesk.ticket";
    pub const COMPANION_TIMER: &str = "timer.timer";
    pub const TASK_STOP_WIZARD: &str = "project.task.create.timesheet";
    pub const TICKET_STOP_WIZARD: &str = "helpdesk.ticket.create.timesheet";
}
