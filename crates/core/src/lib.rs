pub mod error;
pub mod media;
pub mod protocol;
pub mod session;
pub mod source;
pub mod subscribers;
pub mod supervisor;

pub use error::{AssemblyError, Result, RtspError};
pub use media::{Codec, Frame, FrameAssembler, FrameKind};
pub use protocol::{
    Connector, Delivery, MediaDescription, Medium, RtspClient, SessionDescription, SourceEvent,
    StreamUrl, TransportPreference, UnitSource,
};
pub use session::{EndReason, Session, SessionOutcome, SessionState, SubsessionId};
pub use source::{SourceConfig, StreamSource};
pub use subscribers::{Subscribers, Subscription, SubscriptionId};
pub use supervisor::{Backoff, ReconnectPolicy, Supervisor};
