pub mod settings;

pub use settings::Signals;
