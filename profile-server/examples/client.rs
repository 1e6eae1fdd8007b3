//! Create, update, read and delete a profile on a running profile-server.
//!
//! Start the server with `cargo run`, then run `cargo run --example client`.

use clap::Parser;
use n0_snafu::{Result, ResultExt};
use serde_json::{Value, json};

#[derive(Parser, Debug)]
struct Cli {
    /// GraphQL endpoint of the server
    #[clap(long, default_value = "http://localhost:8080/graphql")]
    endpoint: String,
    /// pnc of the profile to create
    #[clap(long, default_value = "demo")]
    pnc: String,
}

async fn execute(client: &reqwest::Client, endpoint: &str, query: String) -> Result<Value> {
    let body = client
        .post(endpoint)
        .json(&json!({ "query": query }))
        .send()
        .await
        .e()?
        .json::<Value>()
        .await
        .e()?;
    if let Some(errors) = body.get("errors") {
        println!("errors: {errors}");
    }
    Ok(body["data"].clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let client = reqwest::Client::new();
    let endpoint = args.endpoint.as_str();
    let pnc = args.pnc;

    let created = execute(
        &client,
        endpoint,
        format!(
            r#"mutation {{ profileCreate(profile: {{ pnc: "{pnc}", elc: "elc-1", cpv: "cpv-1" }}) {{ id pnc elc cpv }} }}"#
        ),
    )
    .await?;
    println!("created: {}", created["profileCreate"]);
    let Some(id) = created["profileCreate"]["id"].as_str() else {
        return Ok(());
    };

    let updated = execute(
        &client,
        endpoint,
        format!(
            r#"mutation {{ profileUpdate(id: "{id}", profile: {{ pnc: "{pnc}", elc: "elc-2", cpv: "cpv-1" }}) {{ id elc }} }}"#
        ),
    )
    .await?;
    println!("updated: {}", updated["profileUpdate"]);

    let found = execute(
        &client,
        endpoint,
        format!(r#"{{ profileByPnc(pnc: "{pnc}") {{ id pnc elc cpv }} }}"#),
    )
    .await?;
    println!("by pnc: {}", found["profileByPnc"]);

    let deleted = execute(
        &client,
        endpoint,
        format!(r#"mutation {{ profileDelete(id: "{id}") }}"#),
    )
    .await?;
    println!("deleted: {}", deleted["profileDelete"]);
    Ok(())
}
