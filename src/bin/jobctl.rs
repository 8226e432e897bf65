//! Command-line harness for the jobflow HTTP API.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jobflow::services::identity::AccessClaims;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[clap(name = "jobctl")]
#[clap(about = "Submit jobs to a jobflow API and inspect their status")]
struct Cli {
    /// Base URL of the API
    #[clap(long, env = "JOBFLOW_API_URL", default_value = "http://localhost:3000")]
    base_url: String,

    /// Access token sent as `Authorization: Bearer <token>`
    #[clap(long, env = "JOBFLOW_TOKEN")]
    token: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a new job
    Submit {
        #[clap(long, default_value = "Test Job")]
        name: String,
        #[clap(long, default_value = "submit a job")]
        action: String,
        #[clap(long, default_value = "This is context 1")]
        context1: String,
        #[clap(long, default_value = "This is context 2")]
        context2: String,
    },

    /// Check the status of one job
    Status {
        job_id: String,
    },

    /// List today's jobs for the token's user
    List,

    /// Check that the API is reachable
    Ping,

    /// Sign a development token for a user id
    MintToken {
        #[clap(long)]
        user: String,
        #[clap(long, env = "JWT_SECRET")]
        secret: String,
        #[clap(long, env = "JWT_ISSUER")]
        issuer: Option<String>,
        /// Lifetime in seconds
        #[clap(long, default_value_t = 3600)]
        ttl: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.base_url.trim_end_matches('/');

    let output = match cli.command {
        Command::Submit {
            name,
            action,
            context1,
            context2,
        } => {
            let body = json!({
                "name": name,
                "action": action,
                "context1": context1,
                "context2": context2,
            });
            let request = client.post(format!("{base}/job")).json(&body);
            send(authorize(request, cli.token.as_deref())?).await?
        }
        Command::Status { job_id } => {
            let request = client
                .get(format!("{base}/job"))
                .query(&[("job_id", job_id.as_str())]);
            send(authorize(request, cli.token.as_deref())?).await?
        }
        Command::List => {
            let request = client.get(format!("{base}/jobs"));
            send(authorize(request, cli.token.as_deref())?).await?
        }
        Command::Ping => send(client.get(format!("{base}/ping"))).await?,
        Command::MintToken {
            user,
            secret,
            issuer,
            ttl,
        } => {
            let claims = AccessClaims {
                sub: user,
                exp: chrono::Utc::now().timestamp() + ttl,
                iss: issuer,
            };
            let token = encode(
                &Header::new(Algorithm::HS256),
                &claims,
                &EncodingKey::from_secret(secret.as_bytes()),
            )
            .context("failed to sign token")?;
            println!("{token}");
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn authorize(request: reqwest::RequestBuilder, token: Option<&str>) -> Result<reqwest::RequestBuilder> {
    match token {
        Some(token) => Ok(request.bearer_auth(token)),
        None => bail!("a token is required; pass --token or set JOBFLOW_TOKEN"),
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request.send().await.context("request failed")?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .with_context(|| format!("non-JSON response with status {status}"))?;

    if !status.is_success() {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("{status}: {message}");
    }
    Ok(body)
}
