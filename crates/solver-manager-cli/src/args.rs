use std::time::Duration;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DemoArgs {
    pub tenants: u64,
    pub tasks: usize,
    pub employees: usize,
    pub time_limit: Duration,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            tenants: 3,
            tasks: 24,
            employees: 4,
            time_limit: Duration::from_secs(2),
        }
    }
}

pub const USAGE: &str =
    "usage: solver-manager [--tenants N] [--tasks N] [--employees N] [--time-limit-ms N]";

impl DemoArgs {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(flag) = args.next() {
            let value = args
                .next()
                .ok_or_else(|| format!("missing value for '{flag}'"))?;
            match flag.as_str() {
                "--tenants" => parsed.tenants = number(&flag, &value)?,
                "--tasks" => parsed.tasks = number(&flag, &value)?,
                "--employees" => parsed.employees = number(&flag, &value)?,
                "--time-limit-ms" => {
                    parsed.time_limit = Duration::from_millis(number(&flag, &value)?);
                }
                _ => return Err(format!("unknown argument '{flag}'")),
            }
        }

        if parsed.employees == 0 {
            return Err("--employees must be at least 1".to_string());
        }
        Ok(parsed)
    }
}

fn number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("'{value}' is not a valid value for '{flag}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<DemoArgs, String> {
        DemoArgs::parse(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn no_arguments_yield_defaults() {
        assert_eq!(parse(&[]).unwrap(), DemoArgs::default());
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&["--tenants", "5", "--time-limit-ms", "250"]).unwrap();
        assert_eq!(args.tenants, 5);
        assert_eq!(args.time_limit, Duration::from_millis(250));
        assert_eq!(args.tasks, 24);
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(parse(&["--tasks"]).unwrap_err().contains("missing value"));
        assert!(parse(&["--tasks", "lots"]).unwrap_err().contains("not a valid value"));
        assert!(parse(&["--verbose", "1"]).unwrap_err().contains("unknown argument"));
        assert!(parse(&["--employees", "0"]).is_err());
    }
}
