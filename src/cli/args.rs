use clap::Parser;

#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(name = "sales_agent", version)]
#[command(
    about = "Terminal chat with the Contoso sales analysis agent",
    long_about = "Terminal chat with the Contoso sales analysis agent\n\nEnvironment (a .env file in the working directory is loaded first):\n  PROJECT_ENDPOINT       agent service endpoint (required)\n  MODEL_DEPLOYMENT_NAME  model deployment used by the agent\n  ENVIRONMENT            environment tag stored on the agent (default: local)\n  PROJECT_ACCESS_TOKEN   bearer token sent with every request\n  PROJECT_API_VERSION    api-version query parameter (default: v1)\n\nConfig file loading:\n  1. $XDG_CONFIG_HOME/sales_agent/config.toml\n  2. ~/.config/sales_agent/config.toml\n\nType `exit` at the prompt to delete the agent and thread and quit."
)]
pub struct CliArgs {}
