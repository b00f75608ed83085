use std::fs;

use simpl_sry::Sry;

use crate::cmd::{Context, SendArgs};
use crate::exit::{sry_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_event, MessageEvent};

pub fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let sender_name = args
        .sender
        .clone()
        .unwrap_or_else(|| format!("simpl_send_{}", std::process::id()));

    let mut sender = Sry::open_with_config(&sender_name, ctx.sry_config.clone())
        .map_err(|err| sry_error("register failed", err))?;
    let receiver = sender
        .locate(&args.host, &args.name, args.reply_size, args.protocol)
        .map_err(|err| sry_error("locate failed", err))?;
    tracing::debug!(name = %args.name, host = %args.host, remote = receiver.is_remote(), "receiver located");

    let mut reply = vec![0u8; args.reply_size];
    for _ in 0..args.repeat.max(1) {
        let len = sender
            .send(&receiver, &payload, &mut reply)
            .map_err(|err| sry_error("send failed", err))?;
        print_event(
            &MessageEvent::new("reply", receiver.name(), &reply[..len]),
            &reply[..len],
            ctx.format,
        );
    }

    sender
        .close()
        .map_err(|err| sry_error("close failed", err))?;
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use simpl_sry::Protocol;

    fn args() -> SendArgs {
        SendArgs {
            name: "echo".to_string(),
            host: String::new(),
            protocol: Protocol::Tcp,
            sender: None,
            json: None,
            data: None,
            file: None,
            reply_size: 64,
            repeat: 1,
        }
    }

    #[test]
    fn payload_defaults_to_empty() {
        assert!(resolve_payload(&args()).unwrap().is_empty());
    }

    #[test]
    fn invalid_json_is_usage_error() {
        let mut bad = args();
        bad.json = Some("{not json".to_string());
        assert_eq!(resolve_payload(&bad).unwrap_err().code, USAGE);
    }

    #[test]
    fn data_payload_is_bytes() {
        let mut data = args();
        data.data = Some("hello".to_string());
        assert_eq!(resolve_payload(&data).unwrap(), b"hello");
    }
}
