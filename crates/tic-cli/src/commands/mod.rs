pub mod jobs;
pub mod referral;
pub mod subscription;
pub mod wallet;
