use serde::Serialize;

use fynelo_queue::SearchJob;

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct UserJobsResponse {
    pub jobs: Vec<SearchJob>,
    pub count: usize,
}

impl From<Vec<SearchJob>> for UserJobsResponse {
    fn from(jobs: Vec<SearchJob>) -> Self {
        Self {
            count: jobs.len(),
            jobs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    pub available: bool,
    pub queue_length: u64,
    pub status: &'static str,
}
