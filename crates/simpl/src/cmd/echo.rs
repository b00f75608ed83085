use simpl_sry::{install_signal_teardown, Received, Sry, PROXY_SHUTDOWN};

use crate::cmd::{Context, EchoArgs};
use crate::exit::{sry_error, CliResult, SUCCESS};
use crate::output::{print_event, MessageEvent};

pub fn run(args: EchoArgs, ctx: &Context) -> CliResult<i32> {
    install_signal_teardown();
    let mut receiver = Sry::open_with_config(&args.name, ctx.sry_config.clone())
        .map_err(|err| sry_error("register failed", err))?;
    tracing::info!(name = %args.name, "echo receiver ready");

    let mut answered = 0usize;
    while args.count.is_none_or(|count| answered < count) {
        let msg = match receiver
            .receive()
            .map_err(|err| sry_error("receive failed", err))?
        {
            Received::Message(msg) => msg,
            Received::Proxy(PROXY_SHUTDOWN) => {
                tracing::info!("shutdown requested");
                break;
            }
            Received::Proxy(value) => {
                let text = value.to_string();
                print_event(
                    &MessageEvent::new("proxy", &args.name, text.as_bytes()),
                    text.as_bytes(),
                    ctx.format,
                );
                continue;
            }
        };

        let reply = echo_reply(msg.payload(), args.reverse);
        let sender = msg.sender_name().to_string();
        print_event(&MessageEvent::new("message", &sender, msg.payload()), msg.payload(), ctx.format);
        tracing::debug!(%sender, size = reply.len(), "echoing message");
        if let Err(err) = receiver.reply(msg, &reply) {
            tracing::warn!(%sender, error = %err, "reply failed");
        }
        answered += 1;
    }

    receiver
        .close()
        .map_err(|err| sry_error("close failed", err))?;
    Ok(SUCCESS)
}

fn echo_reply(payload: &[u8], reverse: bool) -> Vec<u8> {
    let mut reply = payload.to_vec();
    if reverse {
        reply.reverse();
    }
    reply
}
