pub mod conversation;
pub mod extraction;
pub mod finance;
pub mod intent;
