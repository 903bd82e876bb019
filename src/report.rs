use crate::{
    classify::Classification,
    job::{Conversion, ConversionJob, EngineAttempt},
    pages::PageEditSummary,
    policy::Strategy,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: ConversionJob,
    pub conversion: Option<Conversion>,
    pub classification: Option<Classification>,
    pub strategies: Vec<Strategy>,
    pub attempts: Vec<EngineAttempt>,
    pub page_edit: Option<PageEditSummary>,
    pub output: Option<String>,
    /// Every delivered file when a job produces more than one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<String>,
    pub soft_failure: bool,
    pub started: String,
    pub finished: String,
}
