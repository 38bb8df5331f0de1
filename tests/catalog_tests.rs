use coursework::apps::catalog;
use coursework::router::{AppState, Method, Request, Router};
use coursework::settings::Settings;

fn site(template_dir: &str) -> Router {
    let mut settings = Settings::default();
    settings.template.dir = template_dir.to_string();
    catalog::router(AppState::new(settings))
}

#[tokio::test]
async fn home_page_renders_the_base_layout() {
    let resp = site("templates/catalog")
        .handle(Request::new(Method::GET, "/"))
        .await;
    assert_eq!(resp.status_code, 200);
    assert!(resp.body.contains("<title>Shop</title>"));
    assert!(resp.body.contains("Welcome to the shop"));
    assert!(resp.body.contains("cdn.tailwindcss.com"));
    // Live reload is off outside debug mode.
    assert!(!resp.body.contains("/ws/reload"));
}

#[tokio::test]
async fn category_page_shows_the_decoded_name() {
    let resp = site("templates/catalog")
        .handle(Request::new(Method::GET, "/category/winter%20coats"))
        .await;
    assert_eq!(resp.status_code, 200);
    assert!(resp.body.contains("<title>winter coats</title>"));
    assert!(resp.body.contains("Category: winter coats"));
    assert!(!resp.body.contains("Welcome to the shop"));
}

#[tokio::test]
async fn product_page_escapes_its_name() {
    let resp = site("templates/catalog")
        .handle(Request::new(Method::GET, "/product/%3Cb%3Eboots%3C%2Fb%3E"))
        .await;
    assert_eq!(resp.status_code, 200);
    assert!(resp.body.contains("Product: &lt;b&gt;boots&lt;/b&gt;"));
}

#[tokio::test]
async fn unknown_pages_are_404() {
    let router = site("templates/catalog");
    for path in ["/category", "/category/", "/products/shoes", "/category/a/b"] {
        let resp = router.handle(Request::new(Method::GET, path)).await;
        assert_eq!(resp.status_code, 404, "{}", path);
    }
}

#[tokio::test]
async fn missing_template_directory_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let resp = site(dir.path().to_str().unwrap())
        .handle(Request::new(Method::GET, "/"))
        .await;
    assert_eq!(resp.status_code, 404);
    assert!(resp.body.contains("not found"));
}

#[tokio::test]
async fn debug_mode_injects_live_reload() {
    let mut settings = Settings::default();
    settings.debug = true;
    settings.ws_port = 6123;
    settings.template.dir = "templates/catalog".to_string();
    let router = catalog::router(AppState::new(settings));
    let resp = router.handle(Request::new(Method::GET, "/")).await;
    assert!(resp.body.contains(":6123/ws/reload"));
}
