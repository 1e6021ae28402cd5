pub mod layout;
pub mod settings;

pub use layout::HostLayout;
pub use settings::Settings;
