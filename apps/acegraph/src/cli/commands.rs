//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands. All file
//! I/O of the workspace happens here.

use crate::config::Config;
use acegraph_core::primitives::MAX_DATASET_SIZE;
use acegraph_core::{
    AdContext, AnalysisOptions, AnalysisReport, Dataset, DatasetCompatibility, DatasetHeader,
    ExportOptions, GraphError, GraphExport, KnownCollector, Objects, Pipeline, Schema, analyze,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: usize) -> Result<(), GraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GraphError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size as u64 {
        return Err(GraphError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, GraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        GraphError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(GraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path and require a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, GraphError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        GraphError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(GraphError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| GraphError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// DATASETS
// =============================================================================

fn read_bytes(path: &Path) -> Result<Vec<u8>, GraphError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_DATASET_SIZE)?;
    std::fs::read(&validated)
        .map_err(|e| GraphError::IoError(format!("Read '{}': {}", path.display(), e)))
}

/// Read and decode a dataset file.
pub fn read_dataset(path: &Path) -> Result<Dataset, GraphError> {
    Dataset::from_bytes(&read_bytes(path)?)
}

/// Write a dataset file.
pub fn write_dataset(dataset: &Dataset, path: &Path) -> Result<(), GraphError> {
    let validated = validate_output_path(path)?;
    std::fs::write(&validated, dataset.to_bytes()?)
        .map_err(|e| GraphError::IoError(format!("Write '{}': {}", path.display(), e)))
}

/// Refuse unknown collectors, warn about untested versions.
pub fn check_compatibility(
    path: &Path,
    header: &DatasetHeader,
    known: &[KnownCollector],
) -> Result<(), GraphError> {
    match header.compatibility(known) {
        DatasetCompatibility::Accepted => {
            tracing::debug!(path = %path.display(), collector = %header.collector, "dataset accepted");
            Ok(())
        }
        DatasetCompatibility::Flagged(reason) => {
            tracing::warn!(path = %path.display(), %reason, "dataset from untested collector version");
            Ok(())
        }
        DatasetCompatibility::Rejected(reason) => Err(GraphError::UnsupportedDataset(format!(
            "{}: {}",
            path.display(),
            reason
        ))),
    }
}

// =============================================================================
// ANALYSIS
// =============================================================================

/// Result of one analysis run.
pub struct Analysis {
    pub schema: Arc<Schema>,
    pub context: Arc<AdContext>,
    pub objects: Objects,
}

/// Load every dataset into its own store and run all stages over them.
pub fn run_analysis(config: &Config, datasets: &[PathBuf]) -> Result<Analysis, GraphError> {
    let schema = Schema::new();
    let mut pipeline = Pipeline::new();
    let context = analyze::register(&schema, &mut pipeline, config.analysis_options())?;
    let known = config.known_collectors();

    let mut sources = Vec::with_capacity(datasets.len());
    for path in datasets {
        let dataset = read_dataset(path)?;
        check_compatibility(path, &dataset.header, &known)?;
        let objects = Objects::new(&schema);
        let summary = dataset.load_into(&objects)?;
        tracing::info!(
            path = %path.display(),
            loaded = summary.loaded,
            rejected = summary.rejected,
            "dataset read"
        );
        sources.push(objects);
    }

    let objects = pipeline.run(&schema, sources)?;
    Ok(Analysis {
        schema,
        context,
        objects,
    })
}

/// What `analyze` puts into the written graph.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    /// Edge names to keep; empty keeps all.
    pub edges: Vec<String>,
    pub include_hidden: bool,
    pub attributes: Vec<String>,
}

pub fn build_report(analysis: &Analysis, request: &ExportRequest) -> Result<AnalysisReport, GraphError> {
    let mask = if request.edges.is_empty() {
        None
    } else {
        Some(
            analysis
                .schema
                .edges()
                .bitmap_from_names(request.edges.iter().map(String::as_str))?,
        )
    };
    let options = ExportOptions {
        mask,
        include_hidden: request.include_hidden,
        attributes: request.attributes.clone(),
        include_isolated: false,
    };
    Ok(AnalysisReport {
        stats: analysis.objects.stats(),
        graph: GraphExport::from_objects(&analysis.objects, &options),
    })
}

/// Write `report` as JSON and return the byte count.
pub fn write_report(report: &AnalysisReport, path: &Path, pretty: bool) -> Result<usize, GraphError> {
    let validated = validate_output_path(path)?;
    let data = if pretty {
        serde_json::to_vec_pretty(report)
    } else {
        serde_json::to_vec(report)
    }
    .map_err(|e| GraphError::SerializationError(e.to_string()))?;

    std::fs::write(&validated, &data)
        .map_err(|e| GraphError::IoError(format!("Write '{}': {}", path.display(), e)))?;
    Ok(data.len())
}

// =============================================================================
// ANALYZE COMMAND
// =============================================================================

pub fn cmd_analyze(
    config: &Config,
    datasets: &[PathBuf],
    request: &ExportRequest,
    json_mode: bool,
    quiet: bool,
) -> Result<(), GraphError> {
    let analysis = run_analysis(config, datasets)?;
    let report = build_report(&analysis, request)?;
    let written = write_report(&report, &config.output.path, config.output.pretty)?;
    tracing::info!(
        path = %config.output.path.display(),
        bytes = written,
        nodes = report.graph.nodes.len(),
        edges = report.graph.edges.len(),
        "graph written"
    );

    if quiet {
        return Ok(());
    }
    if json_mode {
        let output = serde_json::json!({
            "output": config.output.path.to_string_lossy(),
            "bytes": written,
            "stats": report.stats,
            "suppressed_warnings": analysis
                .context
                .warnings
                .suppressed()
                .into_iter()
                .collect::<std::collections::BTreeMap<_, _>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("acegraph Analysis");
    println!("=================");
    println!("Datasets:    {}", datasets.len());
    println!("Objects:     {}", report.stats.objects);
    println!("Edge pairs:  {}", report.stats.edge_pairs);
    println!("Exported:    {} nodes, {} edges", report.graph.nodes.len(), report.graph.edges.len());
    println!("Output:      {:?} ({} bytes)", config.output.path, written);
    if !report.stats.per_edge.is_empty() {
        println!();
        for (edge, count) in &report.stats.per_edge {
            println!("  {:<28} {}", edge, count);
        }
    }
    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

pub fn cmd_inspect(config: &Config, datasets: &[PathBuf], json_mode: bool) -> Result<(), GraphError> {
    let known = config.known_collectors();
    let mut rows = Vec::with_capacity(datasets.len());
    for path in datasets {
        let header = Dataset::read_header(&read_bytes(path)?)?;
        let verdict = match header.compatibility(&known) {
            DatasetCompatibility::Accepted => "accepted".to_string(),
            DatasetCompatibility::Flagged(reason) => format!("flagged: {reason}"),
            DatasetCompatibility::Rejected(reason) => format!("rejected: {reason}"),
        };
        rows.push((path.clone(), header, verdict));
    }

    if json_mode {
        let output: Vec<_> = rows
            .iter()
            .map(|(path, header, verdict)| {
                serde_json::json!({
                    "path": path.to_string_lossy(),
                    "header": header,
                    "compatibility": verdict,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    for (path, header, verdict) in rows {
        println!("{}", path.display());
        println!("  Collector: {} {} ({})", header.collector, header.version, header.commit);
        println!("  Collected: {}", header.collected.to_rfc3339());
        println!("  Verdict:   {}", verdict);
    }
    Ok(())
}

// =============================================================================
// EDGES COMMAND
// =============================================================================

pub fn cmd_edges(json_mode: bool) -> Result<(), GraphError> {
    let schema = Schema::new();
    let mut pipeline = Pipeline::new();
    analyze::register(&schema, &mut pipeline, AnalysisOptions::default())?;
    let edges = schema.edges();

    if json_mode {
        let output: Vec<_> = edges
            .iter()
            .map(|(_, info)| {
                serde_json::json!({
                    "name": info.name,
                    "description": info.description,
                    "tags": info.tags,
                    "hidden": info.hidden,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    for (_, info) in edges.iter() {
        let marker = if info.hidden { " (hidden)" } else { "" };
        println!("{:<28} {}{}", info.name, info.description, marker);
    }
    Ok(())
}

// =============================================================================
// CONFIG COMMAND
// =============================================================================

pub fn cmd_config(config: &Config) -> Result<(), GraphError> {
    let text = serde_json::to_string_pretty(config)
        .map_err(|e| GraphError::SerializationError(e.to_string()))?;
    println!("{text}");
    Ok(())
}
