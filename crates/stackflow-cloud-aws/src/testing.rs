use stackflow_core::DeploymentEnv;

pub(crate) fn test_vars() -> Vec<(&'static str, &'static str)> {
    vec![
        ("ACCOUNT_ID", "123456789012"),
        ("DOMAIN_NAME", "example.com"),
        ("FRONTEND_FQDN", "app.example.com"),
        ("BACKEND_FQDN", "api.example.com"),
        ("ADMIN_EMAIL", "owner@mail.test"),
        ("ADMIN_PASSWORD", "correct-horse-battery"),
        ("STRIPE_KEY", "pk_live_frontdoor"),
        ("STRIPE_SECRET", "sk_live_frontdoor"),
        ("STRIPE_WEBHOOK_SECRET", "whsec_frontdoor"),
        ("AWS_ACCESS_KEY_ID", "AKIAFRONTDOOR"),
        ("AWS_SECRET_ACCESS_KEY", "frontdoorSecretAccessKey"),
    ]
}

pub(crate) fn test_env() -> DeploymentEnv {
    let vars = test_vars();
    DeploymentEnv::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
    .unwrap()
}
