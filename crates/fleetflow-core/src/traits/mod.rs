//! Seams between the monitor and its external collaborators.

pub mod channel;
pub mod source;

pub use channel::ChannelSender;
pub use source::OpportunitySource;
