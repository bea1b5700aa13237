use std::io::{self, Write};

use tracing_subscriber::EnvFilter;
use watsonx_provider::catalog;
use watsonx_provider::core::traits::ProviderAdapter;
use watsonx_provider::{
    AdapterContext, CallSettings, ChatMessage, ChatRequest, MessageRole, SettingsContext,
    WatsonxAdapter,
};

const DEFAULT_MODEL: &str = "ibm/granite-3-8b-instruct";

struct CliConfig {
    model: String,
    max_tokens: Option<u32>,
    list_models: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let config = parse_config(std::env::args().skip(1).collect())?;
    let adapter = WatsonxAdapter::new(SettingsContext::new())?;

    if config.list_models {
        let models = adapter.list_models(&CallSettings::default()).await?;
        println!("{}", catalog::export_models_json(&models)?);
        return Ok(());
    }

    eprintln!(
        "watsonx_cli: model={}, commands=/exit /quit /clear",
        config.model
    );

    let ctx = AdapterContext::default();
    let mut history: Vec<ChatMessage> = Vec::new();
    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }

        let user_text = input.trim();
        if user_text.is_empty() {
            continue;
        }

        if user_text.eq_ignore_ascii_case("/exit") || user_text.eq_ignore_ascii_case("/quit") {
            break;
        }

        if user_text.eq_ignore_ascii_case("/clear") {
            history.clear();
            println!("(history cleared)");
            continue;
        }

        history.push(ChatMessage::user(user_text));

        let request = ChatRequest {
            model: config.model.clone(),
            messages: history.clone(),
            temperature: None,
            top_p: None,
            max_tokens: config.max_tokens,
            stop: Vec::new(),
        };

        match adapter.run(&request, &ctx).await {
            Ok(response) => {
                println!("{}", response.content);
                history.push(ChatMessage {
                    role: MessageRole::Assistant,
                    content: response.content,
                });
            }
            Err(err) => {
                eprintln!("error: {err}");
                history.pop();
            }
        }
    }

    Ok(())
}

fn parse_config(args: Vec<String>) -> Result<CliConfig, Box<dyn std::error::Error>> {
    let mut model = std::env::var("WATSONX_CLI_MODEL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let mut max_tokens = std::env::var("WATSONX_CLI_MAX_TOKENS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok());

    let mut list_models = false;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--model" => {
                let value = args
                    .get(i + 1)
                    .ok_or("missing value for --model")?
                    .trim()
                    .to_string();
                if value.is_empty() {
                    return Err("--model must be non-empty".into());
                }
                model = value;
                i += 2;
            }
            "--max-tokens" => {
                let value = args.get(i + 1).ok_or("missing value for --max-tokens")?;
                max_tokens = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| "--max-tokens must be a positive integer")?,
                );
                i += 2;
            }
            "--list-models" => {
                list_models = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    Ok(CliConfig {
        model,
        max_tokens,
        list_models,
    })
}

fn print_usage() {
    println!(
        "usage: watsonx_cli [--model <id>] [--max-tokens <n>] [--list-models]\n\
         env: WATSONX_API_KEY, WATSONX_PROJECT_ID | WATSONX_SPACE_ID | WATSONX_INSTANCE_CRN, WATSONX_URL"
    );
}
