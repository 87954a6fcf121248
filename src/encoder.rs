// Argument encoder: turns a call name plus positional and named values
// into the request the server expects. Which values are file uploads is
// decided here from the descriptor, never by looking at the values.

use crate::descriptor::ApiDescriptor;
use crate::error::{ClientError, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;

/// Field carrying the call name in every encoded request.
pub const CALL_NAME_FIELD: &str = "api_name";

/// Values given on the command line, split into positional and named.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<String>,
    pub named: BTreeMap<String, String>,
}

impl CallArgs {
    pub fn positional<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CallArgs {
            positional: values.into_iter().map(Into::into).collect(),
            named: BTreeMap::new(),
        }
    }

    pub fn with_named(mut self, name: &str, value: &str) -> Self {
        self.named.insert(name.to_string(), value.to_string());
        self
    }

    /// Split raw command line words. `name=value` (name made of lowercase
    /// letters and underscores) is a named value; `\=` is a literal `=`.
    pub fn from_cli(words: &[String]) -> Self {
        let mut args = CallArgs::default();
        for word in words {
            match split_named(word) {
                // Named values are taken as typed; only positional words
                // unescape `\=`.
                Some((name, value)) => {
                    args.named.insert(name.to_string(), value.to_string());
                }
                None => args.positional.push(word.replace("\\=", "=")),
            }
        }
        args
    }
}

fn split_named(word: &str) -> Option<(&str, &str)> {
    let eq = word.find('=')?;
    let name = &word[..eq];
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c == '_');
    valid.then(|| (name, &word[eq + 1..]))
}

/// One mapped argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestField {
    Text(String),
    Attachment(PathBuf),
}

/// An encoded call, ready to be turned into a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CallRequest {
    /// Bootstrap call made before the descriptor is known; values pass
    /// through untouched.
    Raw { name: String, args: CallArgs },
    /// Values matched against the descriptor's parameters, in order.
    Mapped {
        name: String,
        fields: Vec<(String, RequestField)>,
    },
}

/// A file opened for upload under a multipart field name.
#[derive(Debug)]
pub struct Attachment {
    pub field: String,
    pub path: PathBuf,
    pub file: File,
}

/// Wire-ready request: JSON body plus opened attachments.
#[derive(Debug)]
pub struct Payload {
    pub json: Value,
    pub attachments: Vec<Attachment>,
}

/// Encode a call. Without a descriptor the arguments pass through as-is.
pub fn encode(name: &str, args: CallArgs, descriptor: Option<&ApiDescriptor>) -> Result<CallRequest> {
    let Some(descriptor) = descriptor else {
        return Ok(CallRequest::Raw {
            name: name.to_string(),
            args,
        });
    };
    let info = descriptor
        .call(name)
        .ok_or_else(|| ClientError::UnknownCall(name.to_string()))?;

    let CallArgs {
        positional,
        mut named,
    } = args;
    let mut positional = positional.into_iter();
    let mut fields = Vec::with_capacity(info.args.len());

    for param in &info.args {
        // Parameters nobody supplied are left out, not defaulted.
        let Some(value) = named.remove(&param.name).or_else(|| positional.next()) else {
            continue;
        };
        let field = if param.takes_file {
            RequestField::Attachment(PathBuf::from(value))
        } else {
            RequestField::Text(value)
        };
        fields.push((param.name.clone(), field));
    }

    if positional.next().is_some() {
        return Err(ClientError::TooManyArguments {
            expected: info.args.len(),
        });
    }
    if let Some(unknown) = named.into_keys().next() {
        return Err(ClientError::UnknownArgument(unknown));
    }

    Ok(CallRequest::Mapped {
        name: name.to_string(),
        fields,
    })
}

impl CallRequest {
    pub fn name(&self) -> &str {
        match self {
            CallRequest::Raw { name, .. } | CallRequest::Mapped { name, .. } => name,
        }
    }

    /// Build the JSON body and open every attachment. Any file that
    /// cannot be opened fails the whole call here, before network I/O.
    pub fn into_payload(self) -> Result<Payload> {
        match self {
            CallRequest::Raw { name, args } => {
                let json = if args.named.is_empty() {
                    let mut items = vec![Value::String(name)];
                    items.extend(args.positional.into_iter().map(Value::String));
                    Value::Array(items)
                } else {
                    let mut map: Map<String, Value> = args
                        .named
                        .into_iter()
                        .map(|(k, v)| (k, Value::String(v)))
                        .collect();
                    map.insert(CALL_NAME_FIELD.into(), Value::String(name));
                    map.insert("args".into(), json!(args.positional));
                    Value::Object(map)
                };
                Ok(Payload {
                    json,
                    attachments: Vec::new(),
                })
            }
            CallRequest::Mapped { name, fields } => {
                let mut map = Map::new();
                let mut attachments = Vec::new();
                for (field, value) in fields {
                    match value {
                        RequestField::Text(text) => {
                            map.insert(field, Value::String(text));
                        }
                        RequestField::Attachment(path) => {
                            let file = File::open(&path).map_err(|source| {
                                ClientError::Attachment {
                                    path: path.clone(),
                                    source,
                                }
                            })?;
                            attachments.push(Attachment { field, path, file });
                        }
                    }
                }
                map.insert(CALL_NAME_FIELD.into(), Value::String(name));
                Ok(Payload {
                    json: Value::Object(map),
                    attachments,
                })
            }
        }
    }
}
