use std::time::Duration;

use backhaul_client::{Client, ClientConfig, Request};

use crate::cmd::SendArgs;
use crate::exit::{client_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_reply, OutputFormat};

/// Per-syscall read timeout while polling for the reply. The overall
/// deadline comes from --timeout; this only bounds individual reads so the
/// deadline can be observed.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = build_request(&args)?;

    let config = ClientConfig {
        io_timeout: Some(POLL_INTERVAL.min(timeout)),
        response_timeout: Some(timeout),
        credential_dir: args.credential_dir.clone(),
        ..ClientConfig::default()
    };

    let mut client = Client::with_config(&args.path, config)
        .map_err(|err| client_error("connect failed", err))?;

    let body = client
        .send(&request)
        .map_err(|err| client_error("request failed", err))?;
    client.close();

    print_reply(&request.function, 0, &body, format);
    Ok(SUCCESS)
}

fn build_request(args: &SendArgs) -> CliResult<Request> {
    match &args.data {
        Some(raw) => {
            let data = serde_json::from_str::<serde_json::Value>(raw)
                .map_err(|err| CliError::new(USAGE, format!("--data is not valid JSON: {err}")))?;
            Ok(Request::with_data(&args.function, data))
        }
        None => Ok(Request::new(&args.function)),
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args(function: &str, data: Option<&str>) -> SendArgs {
        SendArgs {
            path: PathBuf::from("/run/backhaul/api.sock"),
            function: function.to_string(),
            data: data.map(str::to_string),
            timeout: "30s".to_string(),
            credential_dir: None,
        }
    }

    #[test]
    fn builds_plain_request() {
        let request = build_request(&args("ping", None)).unwrap();
        assert_eq!(request, Request::ping());
    }

    #[test]
    fn builds_request_with_json_data() {
        let request = build_request(&args("run_backup", Some("{\"job\":\"nightly\"}"))).unwrap();
        assert_eq!(request, Request::run_backup("nightly"));
    }

    #[test]
    fn rejects_invalid_json_data() {
        let err = build_request(&args("run_backup", Some("not-json"))).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
    }
}
