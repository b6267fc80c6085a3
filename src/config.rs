use anyhow::{Context, Result};
use dotenv::dotenv;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_MODEL_PATH: &str = "model/purchase_model.json";

#[derive(Clone, Debug)]
pub struct Config {
    pub model_path: PathBuf,
    pub host: IpAddr,
    pub port: u16,
}

impl Config {
    /// `.env`, then the environment; a first positional argument
    /// overrides the model path.
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let vars = |key: &str| env::var(key).ok();
        let mut config = Self::from_lookup(vars)?;

        if let Some(path) = env::args().nth(1) {
            config.model_path = PathBuf::from(path);
        }

        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model_path = lookup("PURCHASE_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));

        let host = lookup("HOST")
            .unwrap_or_else(|| "127.0.0.1".to_string())
            .parse()
            .context("Invalid HOST")?;

        let port = lookup("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .context("Invalid PORT")?;

        Ok(Config {
            model_path,
            host,
            port,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.model_path, PathBuf::from("model/purchase_model.json"));
        assert_eq!(config.addr().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PURCHASE_MODEL_PATH", "/srv/models/v2.json"),
            ("HOST", "0.0.0.0"),
            ("PORT", "9000"),
        ]))
        .unwrap();
        assert_eq!(config.model_path, PathBuf::from("/srv/models/v2.json"));
        assert_eq!(config.addr().to_string(), "0.0.0.0:9000");
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"));
    }
}
