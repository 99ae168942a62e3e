pub mod domain;
pub mod media;
pub mod ports;
pub mod session;

pub use domain::{
    ChartPayload, ChartPoint, ChatSummary, ContextualAnswer, ContextualQuery, DisengagementCheck,
    DisengagementReport, Message, MultimodalAnswer, MultimodalQuery, QueryType, QuizResult, Role,
};
pub use media::{release_stream, DataUri, MediaKind, MediaStream, MediaTrack};
pub use ports::{
    ChatHistoryService, ContextualResponseService, EngagementDetectionService, MediaDevices,
    PortError, PortResult, QueryAnsweringService,
};
pub use session::ChatSession;
