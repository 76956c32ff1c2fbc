use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_i64,
    parse_shortfall_policy, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings, IntegritySettings,
    LiveSettings, RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, TelemetrySettings,
};

const DEV_SECRET_KEY: &str = "exam-engine-dev-secret";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAM_ENGINE_HOST", "0.0.0.0");
        let port = env_or_default("EXAM_ENGINE_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAM_ENGINE_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("EXAM_ENGINE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Session Engine");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key_configured = env_optional("SECRET_KEY");
        let secret_key_missing = secret_key_configured.is_none();
        let secret_key = secret_key_configured.unwrap_or_else(|| DEV_SECRET_KEY.to_string());
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exam_engine");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exam_engine");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "30"),
        )?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let shortfall_policy = parse_shortfall_policy(env_optional("SELECTION_SHORTFALL_POLICY"))?;
        let expiry_sweep_interval_seconds = parse_u64(
            "EXPIRY_SWEEP_INTERVAL_SECONDS",
            env_or_default("EXPIRY_SWEEP_INTERVAL_SECONDS", "30"),
        )?;

        let tick_interval_ms =
            parse_u64("LIVE_TICK_INTERVAL_MS", env_or_default("LIVE_TICK_INTERVAL_MS", "1000"))?;
        let heartbeat_interval_seconds = parse_u64(
            "LIVE_HEARTBEAT_INTERVAL_SECONDS",
            env_or_default("LIVE_HEARTBEAT_INTERVAL_SECONDS", "30"),
        )?;
        let heartbeat_grace_seconds = parse_u64(
            "LIVE_HEARTBEAT_GRACE_SECONDS",
            env_or_default("LIVE_HEARTBEAT_GRACE_SECONDS", "90"),
        )?;

        let focus_loss_threshold_ms = parse_i64(
            "INTEGRITY_FOCUS_LOSS_THRESHOLD_MS",
            env_or_default("INTEGRITY_FOCUS_LOSS_THRESHOLD_MS", "5000"),
        )?;
        let alert_cooldown_ms = parse_i64(
            "INTEGRITY_ALERT_COOLDOWN_MS",
            env_or_default("INTEGRITY_ALERT_COOLDOWN_MS", "2000"),
        )?;
        let fullscreen_required = env_optional("INTEGRITY_FULLSCREEN_REQUIRED")
            .map(|value| parse_bool(&value))
            .unwrap_or(true);
        let left_page_guard_ttl_seconds = parse_u64(
            "INTEGRITY_LEFT_PAGE_GUARD_TTL_SECONDS",
            env_or_default("INTEGRITY_LEFT_PAGE_GUARD_TTL_SECONDS", "86400"),
        )?;

        let log_level = env_or_default("EXAM_ENGINE_LOG_LEVEL", "info");
        let json =
            env_optional("EXAM_ENGINE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            exam: ExamSettings { shortfall_policy, expiry_sweep_interval_seconds },
            live: LiveSettings {
                tick_interval_ms,
                heartbeat_interval_seconds,
                heartbeat_grace_seconds,
            },
            integrity: IntegritySettings {
                focus_loss_threshold_ms,
                alert_cooldown_ms,
                fullscreen_required,
                left_page_guard_ttl_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate(secret_key_missing)?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn live(&self) -> &LiveSettings {
        &self.live
    }

    pub(crate) fn integrity(&self) -> &IntegritySettings {
        &self.integrity
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self, secret_key_missing: bool) -> Result<(), ConfigError> {
        // Students must see the clock move at least once a second.
        if self.live.tick_interval_ms == 0 || self.live.tick_interval_ms > 1000 {
            return Err(ConfigError::InvalidValue {
                field: "LIVE_TICK_INTERVAL_MS",
                value: self.live.tick_interval_ms.to_string(),
            });
        }

        if self.live.heartbeat_grace_seconds == 0
            || self.live.heartbeat_grace_seconds < self.live.heartbeat_interval_seconds
        {
            return Err(ConfigError::InvalidValue {
                field: "LIVE_HEARTBEAT_GRACE_SECONDS",
                value: self.live.heartbeat_grace_seconds.to_string(),
            });
        }

        if self.integrity.focus_loss_threshold_ms <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "INTEGRITY_FOCUS_LOSS_THRESHOLD_MS",
                value: self.integrity.focus_loss_threshold_ms.to_string(),
            });
        }

        if self.integrity.alert_cooldown_ms < 0 {
            return Err(ConfigError::InvalidValue {
                field: "INTEGRITY_ALERT_COOLDOWN_MS",
                value: self.integrity.alert_cooldown_ms.to_string(),
            });
        }

        if self.exam.expiry_sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXPIRY_SWEEP_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if secret_key_missing {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }
        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
