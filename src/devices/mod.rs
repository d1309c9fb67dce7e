// MIT License - Copyright (c) 2026 Peter Wright
// Device state records

pub mod zone;
pub mod partition;
pub mod pgm;
pub mod system;

pub use zone::{Zone, ZoneStatusFlags};
pub use partition::{Partition, PartitionId, PartitionStatusFlags};
pub use pgm::{Pgm, PgmEvent};
pub use system::{ProblemFlags, SystemStatus};
