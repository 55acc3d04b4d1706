//! Container-runtime lifecycle integration used to learn pod network namespaces

pub mod observer;
pub mod types;

pub use observer::LifecycleEventSender;
pub use observer::LifecycleObserver;
pub use observer::PodNetworkHandler;
pub use types::network_namespace;
pub use types::LifecycleEvent;
pub use types::PodSandbox;
