pub mod customer;
pub mod period;
pub mod pricing;

pub use customer::{CustomerRecord, NormalizedRow, RateClass, SchemaKind};
pub use period::{fiscal_quarter, PeriodLabel, ReportingPeriod};
pub use pricing::{PriceTable, SettlementResult};
