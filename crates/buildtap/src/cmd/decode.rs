use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use buildtap_frame::{FrameConfig, FrameReader, ReadOutcome};
use buildtap_payload::decode_message;

use crate::cmd::{DecodeArgs, ProxyOptions};
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{MessagePrinter, OutputFormat};

/// Print every message in a captured framed stream.
///
/// A stream that ends inside a frame is reported after the complete
/// messages have been printed.
pub fn run(args: DecodeArgs, options: &ProxyOptions, format: OutputFormat) -> CliResult<i32> {
    let source = open_input(&args.input)?;
    let config = FrameConfig {
        max_payload_size: options.max_payload_size(),
    };
    let mut reader = FrameReader::with_config(source, config);
    let mut printer = MessagePrinter::new(format);

    let result = loop {
        let outcome = match reader.read_frame() {
            Ok(outcome) => outcome,
            Err(err) => break Err(frame_error("read failed", err)),
        };

        match outcome {
            ReadOutcome::Frame(wire_frame) => {
                let frame = wire_frame.frame();
                if let Some(channels) = &args.channels {
                    if !channels.contains(&frame.channel) {
                        continue;
                    }
                }

                printer.print(frame, &decode_message(frame));

                if args.count.is_some_and(|count| printer.printed() >= count) {
                    break Ok(SUCCESS);
                }
            }
            ReadOutcome::Closed { partial } if partial.is_empty() => break Ok(SUCCESS),
            ReadOutcome::Closed { partial } => {
                break Err(CliError::new(
                    DATA_INVALID,
                    format!("stream ended inside a frame ({} trailing bytes)", partial.len()),
                ));
            }
        }
    };

    printer.finish();
    result
}

fn open_input(path: &Path) -> CliResult<Box<dyn Read>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path)
        .map_err(|err| io_error(&format!("cannot open {}", path.display()), err))?;
    Ok(Box::new(file))
}
