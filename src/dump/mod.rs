// ABOUTME: Export pipeline from page planning to the compressed output file
// ABOUTME: Re-exports the exporter, planner, serializer and sink entry points

pub mod exporter;
pub mod planner;
pub mod serializer;
pub mod sink;

pub use exporter::{ExportSummary, TableExporter, TableOutcome, TableReport};
pub use planner::{plan, KeyBound, KeyRangePlan, PageDescriptor, PagePlan, PaginationMode};
pub use serializer::{render_insert, render_structure, render_value};
pub use sink::{artifact_name, DumpFile};
