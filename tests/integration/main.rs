//! Integration tests for query-cache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn query_cache(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("query-cache");
        cmd.env("QUERY_CACHE_CONFIG", config_dir.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        query_cache(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("caching proxy"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        query_cache(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("query-cache"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        query_cache(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        query_cache(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[server]"))
            .stdout(predicate::str::contains("port = 0"));
    }

    #[test]
    fn config_set_then_show() {
        let dir = TempDir::new().unwrap();
        query_cache(&dir)
            .args(["config", "set", "server.port", "4321"])
            .assert()
            .success();
        query_cache(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 4321"));
    }

    #[test]
    fn config_init_keeps_existing_without_force() {
        let dir = TempDir::new().unwrap();
        query_cache(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("initialized"));
        query_cache(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
        query_cache(&dir)
            .args(["config", "init", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("reset to defaults"));
    }

    #[test]
    fn config_set_unknown_key() {
        let dir = TempDir::new().unwrap();
        query_cache(&dir)
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_config_shows_hint() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[server\n").unwrap();
        query_cache(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }
}

mod plugin_tests {
    use async_trait::async_trait;
    use query_cache::handler::{FetchOptions, FetchResponse, Fetcher, CACHE_STATUS_HEADER};
    use query_cache::{
        BuildConfig, BundlerConfig, ConfigContext, DefinePlugin, Phase, QueryCacheError,
        QueryCacheOptions, QueryCachePlugin, QueryCacheResult, RewriteContext, TransformContext,
        PORT_DEFINE_KEY,
    };
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct StubFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str, _: &FetchOptions) -> QueryCacheResult<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: format!("payload for {}", url),
            })
        }
    }

    fn rewrite_ctx() -> RewriteContext {
        RewriteContext::new(Phase::ProductionBuild)
    }

    fn post(port: u16, body: &'static str) -> (String, String) {
        let mut response = ureq::post(format!("http://127.0.0.1:{}/", port))
            .header("content-type", "application/json")
            .send(body)
            .unwrap();
        let status = response
            .headers()
            .get(CACHE_STATUS_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.body_mut().read_to_string().unwrap();
        (status, body)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn build_cycle_serves_cached_fetches() {
        let fetcher = Arc::new(StubFetcher::default());
        let plugin = QueryCachePlugin::new(QueryCacheOptions::new().fetch(fetcher.clone()));

        let config = plugin
            .decorate(BuildConfig::new())
            .resolve(&ConfigContext::new(Phase::ProductionBuild));

        config.rewrites.clone().unwrap()(rewrite_ctx())
            .await
            .unwrap();
        let mut bundler = config.transform.clone().unwrap()(
            BundlerConfig::new().with_plugin(DefinePlugin::default()),
            &TransformContext::default(),
        )
        .unwrap();

        let injected = bundler
            .define_values_mut()
            .unwrap()
            .definitions_mut()
            .get(PORT_DEFINE_KEY)
            .cloned()
            .unwrap();
        let port: u16 = serde_json::from_str(&injected).unwrap();
        assert_eq!(Some(port), plugin.coordinator().port());

        let request = r#"{"url":"https://api.example.com/items","options":{"method":"GET"}}"#;
        let (first, second) = tokio::task::spawn_blocking(move || {
            (post(port, request), post(port, request))
        })
        .await
        .unwrap();

        assert_eq!(first.0, "miss");
        assert_eq!(second.0, "hit");
        assert_eq!(first.1, second.1);
        assert!(first.1.contains("payload for https://api.example.com/items"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn two_plugins_get_independent_servers() {
        let a = QueryCachePlugin::new(QueryCacheOptions::new());
        let b = QueryCachePlugin::new(QueryCacheOptions::new());

        let ctx = ConfigContext::new(Phase::DevelopmentServer);
        let ca = a.decorate(BuildConfig::new()).resolve(&ctx);
        let cb = b.decorate(BuildConfig::new()).resolve(&ctx);

        ca.rewrites.unwrap()(rewrite_ctx()).await.unwrap();
        cb.rewrites.unwrap()(rewrite_ctx()).await.unwrap();

        assert_ne!(a.coordinator().port(), b.coordinator().port());
    }

    #[tokio::test]
    async fn busy_preferred_port_fails_the_rewrites_hook() {
        let held = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let busy = held.local_addr().unwrap().port();
        let plugin = QueryCachePlugin::new(QueryCacheOptions::new().port(busy));

        let config = plugin
            .decorate(BuildConfig::new())
            .resolve(&ConfigContext::new(Phase::ProductionBuild));
        let err = config.rewrites.unwrap()(rewrite_ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, QueryCacheError::StartupFailure(_)));
        let err = config.transform.unwrap()(
            BundlerConfig::new().with_plugin(DefinePlugin::default()),
            &TransformContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, QueryCacheError::PortNotReady));
    }
}
