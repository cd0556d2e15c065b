/// Default REST API base URL (local development backend)
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Engine.IO protocol revision spoken by the push channel
pub const ENGINE_IO_VERSION: u8 = 4;

/// Path of the Socket.IO endpoint on the push server
pub const SOCKET_IO_PATH: &str = "/socket.io/";

/// Socket.IO default namespace
pub const DEFAULT_NAMESPACE: &str = "/";

/// Client -> server: register this connection in the user's room
pub const EVENT_JOIN_USER_ROOM: &str = "joinUserRoom";

/// Server -> client: a message was delivered to the user's room
pub const EVENT_RECEIVE_MESSAGE: &str = "receiveMessage";

/// Client -> server: notify recipients of a manager broadcast
pub const EVENT_SEND_MESSAGE: &str = "sendMessage";

/// Initial reconnection delay for the push channel in milliseconds
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Upper bound of the push channel reconnection delay in milliseconds
pub const DEFAULT_RECONNECT_DELAY_MAX_MS: u64 = 5_000;

/// Capacity of the push channel command and notification queues
pub const PUSH_CHANNEL_CAPACITY: usize = 256;

/// Local storage keys
pub const STORAGE_KEY_TOKEN: &str = "token";
pub const STORAGE_KEY_USER: &str = "user";
pub const STORAGE_KEY_THEME: &str = "theme";
