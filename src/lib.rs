// Library modules
pub mod cell;
pub mod config;
pub mod encode;
pub mod grid;
pub mod hub;
pub mod input;
pub mod layout;
pub mod pane;
pub mod protocol;
pub mod pty;
pub mod registry;
pub mod socket;
pub mod style;
pub mod term;
pub mod wire;
pub mod ws;

// Re-export commonly used types
pub use cell::{Cell, ContentTag, WidthClass};
pub use config::ServerConfig;
pub use hub::events::HubEvent;
pub use hub::run::StartupError;
pub use hub::Hub;
pub use pane::{CursorState, Delta, DeltaRow, Pane, PaneId, Snapshot, DEBUG_PANE};
pub use protocol::{ClientMessage, KeyState, Modifiers};
pub use registry::{ClientId, ClientRegistry, SubState};
pub use style::{Color, Style, StyleTable};
pub use term::Emulator;
pub use wire::Value;
