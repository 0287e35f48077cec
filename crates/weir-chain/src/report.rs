use serde::Serialize;

/// Composite outcome of one chain run, emitted as schema-versioned JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: String,
    pub stages: Vec<StageReport>,
    pub cell_status: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub domain: u64,
    pub handlers: usize,
}
