//! # Processor Pipeline
//!
//! Analysis passes registered with a priority. A run executes the eight
//! stages in order with a full barrier between them:
//!
//! 1. the four `BeforeMerge*` stages on every source store, stage by stage
//! 2. identity merging: every source absorbed into one combined store
//! 3. the four `AfterMerge*` stages on the combined store
//!
//! Within a stage processors run in registration order. A processor error
//! aborts the run; processors skip and log objects they cannot read.

use crate::{GraphError, Objects, Schema};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Execution stage of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessPriority {
    BeforeMergeLow,
    BeforeMerge,
    BeforeMergeHigh,
    BeforeMergeFinal,
    AfterMergeLow,
    AfterMerge,
    AfterMergeHigh,
    AfterMergeFinal,
}

impl ProcessPriority {
    /// Every stage in execution order.
    pub const ALL: [Self; 8] = [
        Self::BeforeMergeLow,
        Self::BeforeMerge,
        Self::BeforeMergeHigh,
        Self::BeforeMergeFinal,
        Self::AfterMergeLow,
        Self::AfterMerge,
        Self::AfterMergeHigh,
        Self::AfterMergeFinal,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeMergeLow => "BeforeMergeLow",
            Self::BeforeMerge => "BeforeMerge",
            Self::BeforeMergeHigh => "BeforeMergeHigh",
            Self::BeforeMergeFinal => "BeforeMergeFinal",
            Self::AfterMergeLow => "AfterMergeLow",
            Self::AfterMerge => "AfterMerge",
            Self::AfterMergeHigh => "AfterMergeHigh",
            Self::AfterMergeFinal => "AfterMergeFinal",
        }
    }

    /// True for the stages that run per source before identity merging.
    #[must_use]
    pub fn is_before_merge(self) -> bool {
        self < Self::AfterMergeLow
    }
}

impl fmt::Display for ProcessPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessPriority {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GraphError::UnknownPriority(s.to_string()))
    }
}

/// Analysis pass over one store.
pub type ProcessorFn = Box<dyn Fn(&Objects) -> Result<(), GraphError> + Send + Sync>;

struct Processor {
    description: String,
    priority: ProcessPriority,
    run: ProcessorFn,
}

/// Ordered set of processors.
#[derive(Default)]
pub struct Pipeline {
    processors: Vec<Processor>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor for `priority`.
    pub fn add_processor<F>(&mut self, description: &str, priority: ProcessPriority, processor: F)
    where
        F: Fn(&Objects) -> Result<(), GraphError> + Send + Sync + 'static,
    {
        tracing::debug!(description, %priority, "registered processor");
        self.processors.push(Processor {
            description: description.to_string(),
            priority,
            run: Box::new(processor),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Descriptions of the processors of one stage, in execution order.
    #[must_use]
    pub fn descriptions(&self, priority: ProcessPriority) -> Vec<&str> {
        self.processors
            .iter()
            .filter(|p| p.priority == priority)
            .map(|p| p.description.as_str())
            .collect()
    }

    /// Run every processor of `priority` against `objects`.
    pub fn run_stage(&self, priority: ProcessPriority, objects: &Objects) -> Result<(), GraphError> {
        for processor in self.processors.iter().filter(|p| p.priority == priority) {
            let span = tracing::info_span!(
                "processor",
                priority = %priority,
                description = %processor.description
            );
            let _entered = span.enter();
            let started = Instant::now();
            (processor.run)(objects).inspect_err(|e| {
                tracing::error!(error = %e, "processor failed");
            })?;
            tracing::debug!(elapsed_ms = started.elapsed().as_millis(), "processor finished");
        }
        Ok(())
    }

    /// Run all stages over `sources` and return the merged store.
    pub fn run(&self, schema: &Arc<Schema>, sources: Vec<Objects>) -> Result<Objects, GraphError> {
        for priority in ProcessPriority::ALL.into_iter().filter(|p| p.is_before_merge()) {
            tracing::info!(%priority, sources = sources.len(), "running stage");
            for source in &sources {
                self.run_stage(priority, source)?;
            }
        }

        let combined = Objects::new(schema);
        for source in sources {
            combined.absorb(source)?;
        }
        tracing::info!(objects = combined.len(), "identity merging done");

        for priority in ProcessPriority::ALL.into_iter().filter(|p| !p.is_before_merge()) {
            tracing::info!(%priority, "running stage");
            self.run_stage(priority, &combined)?;
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttributeValue;
    use parking_lot::Mutex;

    #[test]
    fn priority_names_round_trip_case_insensitively() {
        for priority in ProcessPriority::ALL {
            let parsed: ProcessPriority = priority.to_string().to_uppercase().parse().expect("parse");
            assert_eq!(parsed, priority);
        }
        assert!(matches!(
            "Sometime".parse::<ProcessPriority>(),
            Err(GraphError::UnknownPriority(_))
        ));
    }

    #[test]
    fn stages_run_in_priority_then_registration_order() {
        let schema = Schema::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();

        for (name, priority) in [
            ("late", ProcessPriority::AfterMergeFinal),
            ("first", ProcessPriority::BeforeMergeLow),
            ("merged", ProcessPriority::AfterMergeLow),
            ("second", ProcessPriority::BeforeMergeLow),
        ] {
            let log = Arc::clone(&log);
            pipeline.add_processor(name, priority, move |_| {
                log.lock().push(name);
                Ok(())
            });
        }

        pipeline
            .run(&schema, vec![Objects::new(&schema)])
            .expect("run");
        assert_eq!(*log.lock(), ["first", "second", "merged", "late"]);
        assert_eq!(pipeline.descriptions(ProcessPriority::BeforeMergeLow), ["first", "second"]);
    }

    #[test]
    fn before_merge_stages_see_each_source() {
        let schema = Schema::new();
        let name = schema.core().name;
        let mut pipeline = Pipeline::new();
        pipeline.add_processor("tag", ProcessPriority::BeforeMerge, |objects| {
            objects.iterate(|o| {
                o.tag("seen");
                true
            });
            Ok(())
        });

        let a = Objects::new(&schema);
        a.add_new([(name, AttributeValue::from("a"))]).expect("a");
        let b = Objects::new(&schema);
        b.add_new([(name, AttributeValue::from("b"))]).expect("b");

        let combined = pipeline.run(&schema, vec![a, b]).expect("run");
        assert_eq!(combined.len(), 3);
        assert_eq!(combined.with_tag("seen").count(), 2);
    }

    #[test]
    fn processor_error_aborts_run() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ran_after = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran_after);
        pipeline.add_processor("fail", ProcessPriority::BeforeMergeLow, |_| {
            Err(GraphError::MissingPrerequisite("Everyone".into()))
        });
        pipeline.add_processor("after", ProcessPriority::AfterMerge, move |_| {
            *flag.lock() = true;
            Ok(())
        });

        let result = pipeline.run(&schema, vec![Objects::new(&schema)]);
        assert!(matches!(result, Err(GraphError::MissingPrerequisite(_))));
        assert!(!*ran_after.lock());
    }
}
