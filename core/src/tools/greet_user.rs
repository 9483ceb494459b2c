use crate::traits::{Tool, ToolArgs};
use async_trait::async_trait;
use serde_json::{Value, json};

pub struct GreetUserTool;

#[async_trait]
impl Tool for GreetUserTool {
    fn name(&self) -> &str {
        "greetUser"
    }

    fn description(&self) -> &str {
        "This function greets a user by name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Name of the user to greet"
                }
            },
            "required": ["name"]
        })
    }

    async fn invoke(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let name = match args.direct() {
            Some(name) => name,
            None => args.require_str("name")?,
        };

        Ok(json!({ "greeting": format!("Hello, {}!", name) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn greets_by_name() {
        let tool = GreetUserTool;
        let args = ToolArgs::resolve(&tool.spec(), json!({"name": "Ada"})).unwrap();
        let result = tool.invoke(args).await.unwrap();
        assert_eq!(result, json!({"greeting": "Hello, Ada!"}));
    }
}
