//! Station configuration: types, loading and persistence

pub mod manager;
pub mod store;
pub mod types;

pub use manager::{ConfigFormat, ConfigManager, DEFAULT_CONFIG_PATH};
pub use store::{ConfigPersister, ConfigStore, FileConfigStore, MemoryConfigStore};
pub use types::{
    AppConfig, BatchMaterialLot, CommRole, MesConfig, PlcSignalConfig, SerialPortConfig, Side,
    SignalBinding, TcpConfig, TransportConfig, Trigger, UdpConfig,
};
