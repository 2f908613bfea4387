//! Persisted state: root layout, atomic file I/O, the episodic tier, the
//! session registry and consolidation checkpoints.

pub mod checkpoint;
pub mod episodic;
pub mod fsio;
pub mod layout;
pub mod lock;
pub mod registry;

pub use checkpoint::ConversationCheckpoint;
pub use episodic::{ConversationLog, EpisodicStore, StatusChange};
pub use layout::StoreLayout;
pub use lock::RootLock;
pub use registry::{normalize_project_key, ProjectEntry, ResolvedConversation, SessionRegistry};
