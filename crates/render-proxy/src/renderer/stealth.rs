//! Anti-detection profile applied to the shared browser and every page.

/// Launch flags: no sandbox, certificate errors tolerated, automation
/// markers suppressed.
pub const LAUNCH_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-web-security",
    "--ignore-certificate-errors",
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-infobars",
    "--disable-extensions",
    "--disable-background-networking",
    "--no-first-run",
];

/// Registered on every page before any of its own scripts run.
pub const INIT_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    window.chrome = window.chrome || { runtime: {} };
"#;
