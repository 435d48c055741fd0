//! Repository layer for archive access

pub mod attachments;
pub mod messages;

// Re-export concrete repository implementations with simple names
pub use attachments::DbAttachmentRepository as AttachmentRepository;
pub use messages::DbMessageRepository as MessageRepository;

// Re-export repository traits
pub use attachments::AttachmentSource;
pub use messages::MessageSource;
