pub mod registry;
pub mod traits;

pub use registry::{ConnectorFactory, ConnectorRegistry, registry};
pub use traits::{Connector, ConnectorMetadata, ROWS_NOT_MEANINGFUL};

pub use dbctl_common::{ChangeLogEntry, Error, Result};
pub use tokio_util::sync::CancellationToken;
