pub mod poll;
pub mod poll_option;
pub mod poll_vote;
pub mod prelude;
