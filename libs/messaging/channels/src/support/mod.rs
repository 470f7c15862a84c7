//! Concurrency building blocks shared by channels and dispatchers

mod cow;
mod permits;
mod wait;

pub(crate) use cow::CopyOnWriteList;
pub(crate) use permits::Permits;
pub(crate) use wait::wait_while;
