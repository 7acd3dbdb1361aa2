//! scitest core library
//!
//! Declarative queries over a scientific program's output, tolerance-aware
//! comparison against versioned reference records, and the suite runner
//! that ties them together.

pub mod compare;
pub mod error;
pub mod exec;
pub mod fakes;
pub mod loader;
pub mod obs;
pub mod params;
pub mod quantity;
pub mod query;
pub mod query_set;
pub mod registry;
pub mod reporting;
pub mod resolver;
pub mod results;
pub mod runner;
pub mod store;
pub mod suite;
pub mod telemetry;
pub mod value;
pub mod version;

pub use error::{HarnessError, Result};
pub use value::{Data, ParamMap, Value, ValueError};

pub use registry::{Factory, QueryParts, RegistryBuilder, TypeKind, TypeRegistry};

pub use quantity::{
    load_quantity, BoolQuantity, FloatQuantity, IntegerQuantity, MappingQuantity,
    OptionalQuantity, Quantity, SequenceQuantity, StringQuantity,
};
pub use query::{
    load_query, ColumnQuery, CountQuery, ExtractionError, ProgramOutput, Query, RegexQuery,
    TableQuery,
};
pub use query_set::QuerySet;
pub use resolver::{LoadSummary, LoadingContext};
pub use results::{Outcome, QueryResult, ResultSet, SuiteResult};

pub use suite::{Suite, TestDefinition};
pub use version::{SemanticVersion, Version};

pub use exec::{ExecResult, ExecutionError, ExecutionService, InputFile, Invocation};
pub use loader::{DataLoader, FileLoader, Format};
pub use store::{RecordFile, RecordKind, WriteMode};

pub use compare::{
    compare_suite_results, QueryComparison, QuerySetComparison, QueryVerdict, SetOutcome, Side,
    SuiteReport, TestComparison, TestOutcome,
};
pub use runner::{Baseline, RunPhase, SuiteRun, SuiteRunner};
