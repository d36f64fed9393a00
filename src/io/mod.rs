/// CSV export of hourly profiles and sweep rankings.
pub mod export;
