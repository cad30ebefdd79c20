use anyhow::Result;
use clap::Args;
use serde_json::Value;
use smc_client::elements::search;
use smc_client::rest::SmcClient;
use smc_client::SessionContext;
use tabled::{Table, Tabled};

#[derive(Args)]
pub struct SearchArgs {
    /// Element name to look up
    name: String,

    /// Print the full JSON body of the exact match instead of a summary
    #[arg(long)]
    json: bool,
}

#[derive(Tabled)]
struct ElementRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    element_type: String,
    #[tabled(rename = "Href")]
    href: String,
}

pub async fn execute(session: &SessionContext, args: SearchArgs) -> Result<()> {
    let client = SmcClient::new(session.clone());

    if args.json {
        match search::element_as_json(&client, &args.name).await? {
            Some(body) => println!("{}", serde_json::to_string_pretty(&body)?),
            None => println!("No element named {}", args.name),
        }
        return Ok(());
    }

    let elements = search::elements_matching(&client, &args.name).await?;
    if elements.is_empty() {
        println!("No elements matching {}", args.name);
        return Ok(());
    }

    let rows: Vec<ElementRow> = elements
        .iter()
        .map(|element| ElementRow {
            name: text(element, "name"),
            element_type: text(element, "type"),
            href: text(element, "href"),
        })
        .collect();

    let count = rows.len();
    println!("{}", Table::new(rows));
    println!("\nTotal: {count} element(s)");
    Ok(())
}

fn text(element: &Value, key: &str) -> String {
    element
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string()
}
