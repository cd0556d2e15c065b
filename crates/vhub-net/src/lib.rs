// Transport layer: REST calls to the backend and the Socket.IO push channel.

pub mod api;
pub mod error;
pub mod push;

pub use api::{ApiClient, ChatApi, Credentials};
pub use error::NetError;
pub use push::{spawn_push_channel, PushCommand, PushConfig, PushHandle, PushNotification};
