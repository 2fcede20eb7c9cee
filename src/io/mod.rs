/// Job input file loading.
pub mod jobs;
