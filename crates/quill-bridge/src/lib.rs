// Quill command bridge
//
// The only path between the untrusted rendering surface and privileged host
// capabilities. Every call is admission-checked and schema-validated before
// it is forwarded; only plain serializable data crosses in either direction.

mod admission;
mod dispatcher;
mod events;
mod exposure;
mod host;
mod schema;
mod streams;
mod subscription;
mod surface;

#[cfg(test)]
pub(crate) mod testutil;

pub use admission::{AdmissionController, AdmissionSnapshot, DEFAULT_CEILING};
pub use dispatcher::Dispatcher;
pub use events::{crash_channel, CrashReporter, EventBus};
pub use exposure::{
    ExposedSurface, ExposureController, ExposureState, UntrustedContext, SURFACE_GLOBAL,
};
pub use host::{
    AgentTurn, ChatTurn, CommandRunner, FileAccess, HostCapabilities, KnowledgeStore,
    ModelInference, SettingsStore, TokenStream,
};
pub use schema::{FieldKind, FieldRule, Schema};
pub use subscription::SubscriptionHandle;
pub use surface::{channel, CapabilitySurface, OperationDescriptor, EVENT_CHANNELS};
