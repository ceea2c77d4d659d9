use std::env;
use std::io::{self, Read};

use curl::easy::{Easy, List};
use serde::{Deserialize, Serialize};
use url::Url;

const USAGE: &str = "Usage: chatquery --base-url URL --model MODEL --api-key ENV_VAR";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("{0} environment variable not set")]
    MissingApiKey(String),

    #[error("No input provided on stdin")]
    EmptyInput,

    #[error("Failed to read stdin: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid base URL '{url}': {source}")]
    InvalidUrl { url: String, source: url::ParseError },

    #[error("Unsupported URL scheme '{scheme}' in base URL '{url}'")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("Failed to encode request: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request failed: {0}")]
    Transport(#[from] curl::Error),

    #[error("API returned status {status}: {body}")]
    ApiStatus { status: u32, body: String },

    #[error("Failed to parse response: {body}")]
    Parse {
        body: String,
        source: serde_json::Error,
    },

    #[error("No choices in response")]
    EmptyChoices,
}

#[derive(Debug)]
pub struct Config {
    pub base_url: String,
    pub model: String,
    pub api_key_var: String,
}

impl Config {
    /// Parses the flag sequence (program name already stripped by the caller).
    pub fn build(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut base_url: Option<String> = None;
        let mut model: Option<String> = None;
        let mut api_key_var: Option<String> = None;

        while let Some(arg) = args.next() {
            let slot = match arg.as_str() {
                "--base-url" => &mut base_url,
                "--model" => &mut model,
                "--api-key" => &mut api_key_var,
                other => return Err(Error::Usage(format!("unknown option '{other}'\n{USAGE}"))),
            };

            match args.next() {
                Some(value) => *slot = Some(value),
                None => {
                    return Err(Error::Usage(format!("option '{arg}' requires a value\n{USAGE}")));
                }
            }
        }

        match (base_url, model, api_key_var) {
            (Some(base_url), Some(model), Some(api_key_var)) => Ok(Self {
                base_url,
                model,
                api_key_var,
            }),
            _ => Err(Error::Usage(String::from(USAGE))),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    // An absent field is the same as an empty list, not a malformed body.
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Sends one prompt to `{base_url}/chat/completions` and returns the first
/// choice's content.
pub fn execute_query(base_url: &str, model: &str, api_key: &str, content: &str) -> Result<String> {
    let url = Url::parse(base_url).map_err(|source| Error::InvalidUrl {
        url: base_url.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::UnsupportedScheme {
                url: base_url.to_string(),
                scheme: scheme.to_string(),
            });
        }
    }

    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![Message {
            role: String::from("user"),
            content: content.to_string(),
        }],
    };
    let body = serde_json::to_string(&request)?;

    let mut easy = Easy::new();
    easy.url(&format!("{base_url}/chat/completions"))?;
    easy.post(true)?;

    let mut headers = List::new();
    headers.append(&format!("Authorization: Bearer {api_key}"))?;
    headers.append("Content-Type: application/json")?;
    easy.http_headers(headers)?;
    easy.post_fields_copy(body.as_bytes())?;

    let mut response = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|chunk| {
            response.extend_from_slice(chunk);
            Ok(chunk.len())
        })?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    let text = String::from_utf8_lossy(&response).into_owned();
    if status != 200 {
        return Err(Error::ApiStatus { status, body: text });
    }

    let parsed: ChatResponse = serde_json::from_str(&text).map_err(|source| Error::Parse {
        body: text.clone(),
        source,
    })?;

    match parsed.choices.into_iter().next() {
        Some(choice) => Ok(choice.message.content),
        None => Err(Error::EmptyChoices),
    }
}

pub fn run(config: &Config) -> Result<()> {
    let api_key = env::var(&config.api_key_var)
        .map_err(|_| Error::MissingApiKey(config.api_key_var.clone()))?;

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let prompt = input.trim();
    if prompt.is_empty() {
        return Err(Error::EmptyInput);
    }

    eprintln!("base_url: {}", config.base_url);
    eprintln!("model:    {}", config.model);
    eprintln!("api_key:  ******** (from {})", config.api_key_var);
    eprintln!("prompt:   {prompt}");

    let reply = execute_query(&config.base_url, &config.model, &api_key, prompt)?;
    println!("{reply}");

    Ok(())
}
