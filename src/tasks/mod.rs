// src/tasks/mod.rs

//! Built-in task kinds.
//!
//! Every routine here is a thin sequence of calls on the collaborator traits
//! from [`crate::context`], with paced delays in between. Session-bound tasks
//! leave the browser wherever they finished. `loop` is the one composite kind:
//! it runs other built-in (or registered) kinds for several rounds.

pub mod comment;
pub mod like;
pub mod login;
pub mod navigation;
pub mod neighbors;
pub mod pacing;
pub mod repeat;
pub mod wait;

use crate::task::TaskFactory;
use crate::types::TaskKind;

pub use comment::{
    CommentTask, DEFAULT_COMMENT_BOX_SELECTOR, DEFAULT_CONTENT_SELECTOR, DEFAULT_SUBMIT_SELECTOR,
    DEFAULT_TITLE_SELECTOR,
};
pub use like::{DEFAULT_LIKE_SELECTOR, LikeTask};
pub use login::{
    DEFAULT_KEEP_LOGIN_SELECTOR, DEFAULT_LOGIN_SUBMIT_SELECTOR, DEFAULT_PASSWORD_SELECTOR,
    DEFAULT_USERNAME_SELECTOR, LOGIN_URL_KEY, LoginTask, PASSWORD_KEY, USERNAME_KEY,
};
pub use navigation::{GotoUrlTask, ScrollReadTask};
pub use neighbors::{DEFAULT_LINK_SELECTOR, NEIGHBOR_LIST_URL_KEY, VisitNeighborsTask};
pub use pacing::Pacing;
pub use repeat::LoopTask;
pub use wait::WaitTask;

/// Register every built-in kind on `factory`.
pub fn register_builtins(factory: &mut TaskFactory) {
    factory
        .register(TaskKind::WAIT, WaitTask::build)
        .register(TaskKind::GOTO_URL, GotoUrlTask::build)
        .register(TaskKind::SCROLL_READ, ScrollReadTask::build)
        .register(TaskKind::LIKE, LikeTask::build)
        .register(TaskKind::VISIT_NEIGHBORS, VisitNeighborsTask::build)
        .register(TaskKind::COMMENT, CommentTask::build)
        .register(TaskKind::LOGIN, LoginTask::build)
        .register_composite(TaskKind::LOOP, LoopTask::build);
}
