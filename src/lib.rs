pub mod activator;
pub mod backups;
pub mod documents;
pub mod error;
pub mod events;
pub mod game_mode;
pub mod ini;
pub mod install_log;
pub mod link;
pub mod mods;
pub mod paths;
pub mod settings;
pub mod stack;
pub mod transaction;

pub use activator::{ActiveModSet, Activator, OverlayState, VirtualLink, VirtualModInfo};
pub use backups::BackupStore;
pub use error::{CoreError, CoreResult};
pub use events::{ActivationEvent, EventBus};
pub use game_mode::{GameMode, GenericGameMode};
pub use install_log::{
    FileRemoval, GameValueRemoval, InstallLog, LogState, OwnershipOracle, VersionDrift,
    ABSENT_VALUE,
};
pub use link::{create_link, probe, remove_link, LinkError, LinkHints, LinkKind};
pub use mods::{parse_version, ModEntry, ModKey, ModRegistration, ORIGINAL_VALUES_KEY};
pub use paths::{IniKey, VirtualPath};
pub use settings::{LockPolicy, Settings};
pub use stack::InstallerStack;
pub use transaction::{CancelToken, Coordinator, Transaction};
