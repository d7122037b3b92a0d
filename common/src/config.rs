use std::fmt::{Display, Formatter};

#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Database")]
#[group(id = "database")]
pub struct Database {
    /// Full connection URL, takes precedence over the individual settings.
    ///
    /// Both `postgres://` and `sqlite://` URLs are supported.
    #[arg(id = "db-url", long, env = "SPECIMEN_DB_URL")]
    pub url: Option<String>,
    #[arg(id = "db-user", long, env = "SPECIMEN_DB_USER", default_value = "specimen")]
    pub username: String,
    #[arg(
        id = "db-password",
        long,
        env = "SPECIMEN_DB_PASSWORD",
        default_value = "specimen"
    )]
    pub password: String,
    #[arg(id = "db-host", long, env = "SPECIMEN_DB_HOST", default_value = "localhost")]
    pub host: String,
    #[arg(id = "db-port", long, env = "SPECIMEN_DB_PORT", default_value_t = 5432)]
    pub port: u16,
    #[arg(id = "db-name", long, env = "SPECIMEN_DB_NAME", default_value = "specimen")]
    pub name: String,
    #[arg(
        id = "db-max-conn",
        long,
        env = "SPECIMEN_DB_MAX_CONN",
        default_value_t = 75
    )]
    pub max_conn: u32,
    #[arg(id = "db-min-conn", long, env = "SPECIMEN_DB_MIN_CONN", default_value_t = 1)]
    pub min_conn: u32,
    /// Timeout in seconds for establishing a new connection.
    #[arg(
        id = "db-connect-timeout",
        long,
        env = "SPECIMEN_DB_CONNECT_TIMEOUT",
        default_value_t = 8
    )]
    pub connect_timeout: u64,
    /// Timeout in seconds for acquiring a connection from the pool.
    #[arg(
        id = "db-acquire-timeout",
        long,
        env = "SPECIMEN_DB_ACQUIRE_TIMEOUT",
        default_value_t = 30
    )]
    pub acquire_timeout: u64,
    #[arg(
        id = "db-max-lifetime",
        long,
        env = "SPECIMEN_DB_MAX_LIFETIME",
        default_value_t = 3600
    )]
    pub max_lifetime: u64,
    #[arg(
        id = "db-idle-timeout",
        long,
        env = "SPECIMEN_DB_IDLE_TIMEOUT",
        default_value_t = 600
    )]
    pub idle_timeout: u64,
}

impl Database {
    /// Create the configuration from the environment only (no command line arguments).
    pub fn from_env() -> Result<Self, clap::Error> {
        use clap::Parser;

        #[derive(clap::Parser)]
        struct Cli {
            #[command(flatten)]
            database: Database,
        }

        Cli::try_parse_from(["specimen"]).map(|cli| cli.database)
    }

    /// Create a configuration for a SQLite database file, creating the file if necessary.
    pub fn sqlite(path: impl Display) -> Result<Self, clap::Error> {
        Ok(Self {
            url: Some(format!("sqlite://{path}?mode=rwc")),
            ..Self::from_env()?
        })
    }

    pub fn to_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.name
            ),
        }
    }
}

impl Display for Database {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.url {
            Some(_) => write!(f, "{} (url)", self.name),
            None => write!(f, "{}@{}:{}/{}", self.username, self.host, self.port, self.name),
        }
    }
}
