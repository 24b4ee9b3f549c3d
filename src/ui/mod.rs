pub mod terminal;
pub mod virtual_panel;

pub use terminal::TerminalUI;
pub use virtual_panel::{PanelControls, PanelView, VirtualRig, virtual_panel};
