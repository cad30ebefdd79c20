use anyhow::Result;
use serde_json::Value;
use smc_client::monitoring::resolve_field_ids;
use smc_client::SessionContext;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Comment")]
    comment: String,
}

pub async fn execute(session: &SessionContext, ids: Vec<i64>) -> Result<()> {
    let fields = resolve_field_ids(session, ids).await?;

    if fields.is_empty() {
        println!("No fields resolved");
        return Ok(());
    }

    let rows: Vec<FieldRow> = fields
        .iter()
        .map(|field| FieldRow {
            id: text(field, "id"),
            name: text(field, "name"),
            comment: text(field, "comment"),
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

fn text(field: &Value, key: &str) -> String {
    match field.get(key) {
        Some(Value::String(value)) => value.clone(),
        Some(value) => value.to_string(),
        None => "-".to_string(),
    }
}
