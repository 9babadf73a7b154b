use std::path::PathBuf;

use clap::Parser;

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_page_size(value: &str) -> Result<u32, String> {
    let parsed = parse_positive_u32(value)?;
    if parsed > 100 {
        return Err("value must be in range 1..=100".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "cairn",
    about = "Merge messages from parallel CI jobs into one pull request comment per commit",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "INPUT_MESSAGE",
        help = "Message body to record for this job. Rendered verbatim."
    )]
    pub message: String,

    #[arg(
        long = "database-url",
        env = "INPUT_DATABASE_URL",
        hide_env_values = true,
        help = "PostgreSQL connection string for the shared message log."
    )]
    pub database_url: String,

    #[arg(
        long = "github-token",
        env = "INPUT_GITHUB_TOKEN",
        hide_env_values = true,
        help = "Token used to list, create, and update pull request comments."
    )]
    pub github_token: String,

    #[arg(
        long,
        env = "INPUT_MATRIX",
        help = "Optional JSON object of build matrix parameters (toJSON(matrix)). Sorted into the source key."
    )]
    pub matrix: Option<String>,

    #[arg(
        long = "pr-number",
        env = "INPUT_PR_NUMBER",
        help = "Pull request number. Defaults to pull_request.number from the event payload."
    )]
    pub pr_number: Option<u64>,

    #[arg(
        long = "commit-sha",
        env = "INPUT_COMMIT_SHA",
        help = "Commit the message pertains to. Defaults to the pull request head sha, then GITHUB_SHA."
    )]
    pub commit_sha: Option<String>,

    #[arg(long = "github-sha", env = "GITHUB_SHA", hide = true)]
    pub github_sha: Option<String>,

    #[arg(
        long = "event-path",
        env = "GITHUB_EVENT_PATH",
        help = "Path to the webhook event payload of the invoking workflow."
    )]
    pub event_path: Option<PathBuf>,

    #[arg(
        long,
        env = "GITHUB_REPOSITORY",
        help = "Repository in owner/repo form."
    )]
    pub repository: String,

    #[arg(long, env = "GITHUB_WORKFLOW", help = "Workflow name part of the source key.")]
    pub workflow: String,

    #[arg(long, env = "GITHUB_JOB", help = "Job id part of the source key.")]
    pub job: String,

    #[arg(long = "run-id", env = "GITHUB_RUN_ID", help = "Run id of the invoking workflow.")]
    pub run_id: u64,

    #[arg(
        long = "run-attempt",
        env = "GITHUB_RUN_ATTEMPT",
        default_value_t = 1,
        value_parser = parse_positive_u32,
        help = "Attempt counter of the invoking run."
    )]
    pub run_attempt: u32,

    #[arg(
        long = "max-retries",
        env = "CAIRN_MAX_RETRIES",
        default_value_t = 3,
        value_parser = parse_positive_u32,
        help = "Total attempts for the append-resolve transaction under lock contention."
    )]
    pub max_retries: u32,

    #[arg(
        long = "retry-delay-ms",
        env = "CAIRN_RETRY_DELAY_MS",
        default_value_t = 1_000,
        help = "Linear backoff unit: attempt n waits n times this value before retrying."
    )]
    pub retry_delay_ms: u64,

    #[arg(
        long = "lock-timeout-ms",
        env = "CAIRN_LOCK_TIMEOUT_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Maximum wait for the per-commit lock before the attempt fails as a transient conflict."
    )]
    pub lock_timeout_ms: u64,

    #[arg(
        long = "statement-timeout-ms",
        env = "CAIRN_STATEMENT_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Maximum duration of any single statement inside the transaction."
    )]
    pub statement_timeout_ms: u64,

    #[arg(
        long = "github-api-base",
        env = "GITHUB_API_URL",
        default_value = "https://api.github.com",
        help = "Base URL of the GitHub REST API."
    )]
    pub github_api_base: String,

    #[arg(
        long = "comment-page-size",
        env = "CAIRN_COMMENT_PAGE_SIZE",
        default_value_t = 100,
        value_parser = parse_page_size,
        help = "Comments fetched per page while locating the digest comment."
    )]
    pub comment_page_size: u32,

    #[arg(
        long = "comment-max-pages",
        env = "CAIRN_COMMENT_MAX_PAGES",
        default_value_t = 10,
        value_parser = parse_positive_u32,
        help = "Upper bound on comment pages scanned."
    )]
    pub comment_max_pages: u32,

    #[arg(
        long = "bot-login",
        env = "CAIRN_BOT_LOGIN",
        help = "Login owning the digest comment. Defaults to any author of type Bot."
    )]
    pub bot_login: Option<String>,

    #[arg(
        long = "request-timeout-ms",
        env = "CAIRN_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Timeout for each GitHub API request."
    )]
    pub request_timeout_ms: u64,
}
