use pipelane_transport::{default_runtime_dir, find_channel, list_channels};

use crate::cmd::FindArgs;
use crate::exit::{CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_channels, OutputFormat};

pub fn run(args: FindArgs, format: OutputFormat) -> CliResult<i32> {
    let runtime_dir = args
        .runtime_dir
        .clone()
        .unwrap_or_else(default_runtime_dir);

    let channels = match &args.partial {
        Some(partial) => find_channel(partial, Some(&runtime_dir))
            .into_iter()
            .collect::<Vec<_>>(),
        None => list_channels(Some(&runtime_dir)),
    };

    if channels.is_empty() {
        let message = match &args.partial {
            Some(partial) => format!("no open channel matching {partial:?}"),
            None => "no open channels".to_string(),
        };
        return Err(CliError::new(FAILURE, message));
    }

    print_channels(&runtime_dir, &channels, format);
    Ok(SUCCESS)
}
