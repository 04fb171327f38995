//! Key namespace. Job state and cancellation flags live under different
//! prefixes so their TTLs are independent.

pub fn job_state(job_id: &str) -> String {
    format!("job:state:{}", job_id)
}

pub fn active_job(owner_id: u64) -> String {
    format!("job:active:{}", owner_id)
}

pub fn cancel_flag(job_id: &str) -> String {
    format!("job:cancel:{}", job_id)
}
