#![allow(unused_imports)]

pub use super::poll::Entity as Poll;
pub use super::poll_option::Entity as PollOption;
pub use super::poll_vote::Entity as PollVote;
