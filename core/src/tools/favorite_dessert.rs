use crate::traits::{Tool, ToolArgs};
use async_trait::async_trait;
use serde_json::{Value, json};

pub struct FavoriteDessertTool;

#[async_trait]
impl Tool for FavoriteDessertTool {
    fn name(&self) -> &str {
        "favoriteDessert"
    }

    fn description(&self) -> &str {
        "This function returns the users favorite dessert."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dessert": {
                    "type": "string",
                    "description": "Name of the user's favorite dessert"
                }
            },
            "required": ["dessert"]
        })
    }

    async fn invoke(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let dessert = args.require_str("dessert")?;
        Ok(json!({ "greeting": format!("Your favorite dessert is {}!", dessert) }))
    }
}
