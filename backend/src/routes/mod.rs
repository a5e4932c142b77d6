//! Route definitions for the Timber&Grain fulfillment API
//!
//! Protected routes pass the JWT middleware and then a coarse role filter
//! per capability. Services repeat the role check and add the record-level
//! preconditions.

use axum::{
    middleware,
    routing::{delete, get, post, put, MethodRouter},
    Router,
};

use shared::Capability;

use crate::{
    handlers,
    middleware::{auth_middleware, optional_auth, require_capability},
    AppState,
};

/// Role filter for a single route
fn requires(capability: Capability, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(capability, require_capability))
}

/// JWT authentication for a single route
fn authenticated(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Authentication plus role filter, for protected routes inside public groups
fn restricted(
    state: &AppState,
    capability: Capability,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    authenticated(state, requires(capability, route))
}

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        .nest("/auth", auth_routes(&state))
        .nest("/catalog", catalog_routes(&state))
        // Checkout (public, signed-in customers are linked to the order)
        .route(
            "/checkout",
            post(handlers::create_checkout)
                .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth)),
        )
        // Stripe webhook (public, signature verified)
        .route("/webhooks/stripe", post(handlers::stripe_webhook))
        .nest("/orders", order_routes(&state))
        .nest("/shipments", shipment_routes(&state))
        .nest("/shops", shop_routes(&state))
        .nest("/users", user_routes(&state))
        .route(
            "/dashboard",
            restricted(&state, Capability::ViewDashboard, get(handlers::get_dashboard)),
        )
}

/// Authentication routes
fn auth_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .route("/me", authenticated(state, get(handlers::me)))
}

/// Catalog routes (public reads, admin writes)
fn catalog_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/products",
            get(handlers::list_products).merge(restricted(
                state,
                Capability::ManageCatalog,
                post(handlers::create_product),
            )),
        )
        .route(
            "/products/:id",
            get(handlers::get_product).merge(restricted(
                state,
                Capability::ManageCatalog,
                put(handlers::update_product),
            )),
        )
        .route(
            "/products/:id/variants",
            restricted(state, Capability::ManageCatalog, post(handlers::create_variant)),
        )
        .route(
            "/variants/:id",
            restricted(state, Capability::ManageCatalog, put(handlers::update_variant)),
        )
        .route(
            "/materials",
            get(handlers::list_materials).merge(restricted(
                state,
                Capability::ManageCatalog,
                post(handlers::create_material),
            )),
        )
        .route(
            "/materials/:id",
            restricted(state, Capability::ManageCatalog, put(handlers::update_material)),
        )
}

/// Order routes (protected)
fn order_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_orders)
                .merge(requires(Capability::CreateOrder, post(handlers::create_order))),
        )
        .route("/:id", get(handlers::get_order))
        .route("/:id/receipt", get(handlers::get_receipt))
        .route(
            "/:id/take",
            requires(Capability::TakeOrder, post(handlers::take_order)),
        )
        .route(
            "/:id/ready",
            requires(Capability::MarkReady, post(handlers::mark_ready)),
        )
        .route(
            "/:id/claim",
            requires(Capability::ClaimOrder, post(handlers::claim_order)),
        )
        .route(
            "/:id/cancel",
            requires(Capability::CancelOrder, post(handlers::cancel_order)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Shipment routes (protected)
fn shipment_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_shipments))
        .route("/:id", get(handlers::get_shipment))
        .route(
            "/:id/deliver",
            requires(Capability::ResolveShipment, post(handlers::deliver_shipment)),
        )
        .route(
            "/:id/cancel",
            requires(Capability::ResolveShipment, post(handlers::cancel_shipment)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Shop routes (public listing, admin writes, stock for admins and managers)
fn shop_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_shops).merge(restricted(
                state,
                Capability::ManageShops,
                post(handlers::create_shop),
            )),
        )
        .route(
            "/:id",
            restricted(state, Capability::ManageShops, put(handlers::update_shop)),
        )
        .route(
            "/:id/managers",
            restricted(
                state,
                Capability::ManageShops,
                get(handlers::list_managers).post(handlers::assign_manager),
            ),
        )
        .route(
            "/:id/managers/:user_id",
            restricted(state, Capability::ManageShops, delete(handlers::unassign_manager)),
        )
        .route(
            "/:id/stock",
            restricted(state, Capability::AdjustStock, get(handlers::get_stock)),
        )
        .route(
            "/:id/stock/moves",
            restricted(state, Capability::AdjustStock, get(handlers::list_stock_moves)),
        )
        .route(
            "/:id/stock/adjust",
            restricted(state, Capability::AdjustStock, post(handlers::adjust_stock)),
        )
}

/// User administration routes (admin)
fn user_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_users).post(handlers::create_user))
        .route("/:id/active", put(handlers::set_user_active))
        .route_layer(middleware::from_fn_with_state(
            Capability::ManageUsers,
            require_capability,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}
