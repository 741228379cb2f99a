pub mod join_dependency;
pub mod plan;
pub mod projection;
pub mod record;

pub use join_dependency::{JoinDependency, JoinNode};
pub use plan::{EagerLoadEntry, EagerLoadPlan};
pub use projection::{column_alias, column_aliases_with_eager_loading_from_joins};
pub use record::{Loaded, Record, Row};
