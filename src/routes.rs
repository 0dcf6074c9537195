//! 页面路由与访问控制

use crate::types::{User, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    /// 根路径 `/` 重定向到药品目录
    Medicines,
    Orders,
    OrderDetail(i64),
    Prescriptions,
    Cart,
    Checkout,
    Admin,
    AdminOrders,
    MyDeliveries,
}

/// 路由守卫结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    RedirectToLogin,
    Forbidden,
}

impl Route {
    /// 解析路径，未知路径返回 `None`
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        let route = match path {
            "" | "/medicines" => Route::Medicines,
            "/login" => Route::Login,
            "/register" => Route::Register,
            "/orders" => Route::Orders,
            "/prescriptions" => Route::Prescriptions,
            "/cart" => Route::Cart,
            "/checkout" => Route::Checkout,
            "/admin" => Route::Admin,
            "/admin/orders" => Route::AdminOrders,
            "/my-deliveries" => Route::MyDeliveries,
            other => {
                let id = other.strip_prefix("/orders/")?.parse().ok()?;
                Route::OrderDetail(id)
            }
        };
        Some(route)
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::Medicines => "/medicines".to_string(),
            Route::Orders => "/orders".to_string(),
            Route::OrderDetail(id) => format!("/orders/{}", id),
            Route::Prescriptions => "/prescriptions".to_string(),
            Route::Cart => "/cart".to_string(),
            Route::Checkout => "/checkout".to_string(),
            Route::Admin => "/admin".to_string(),
            Route::AdminOrders => "/admin/orders".to_string(),
            Route::MyDeliveries => "/my-deliveries".to_string(),
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Route::Login | Route::Register)
    }
}

pub fn guard(route: Route, user: Option<&User>) -> Access {
    if route.is_public() {
        return Access::Allow;
    }
    let Some(user) = user else {
        return Access::RedirectToLogin;
    };

    let allowed = match route {
        Route::Admin | Route::AdminOrders => user.role.is_admin(),
        Route::MyDeliveries => user.role == UserRole::DeliveryPartner,
        _ => true,
    };
    if allowed { Access::Allow } else { Access::Forbidden }
}

/// 导航链接
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavLink {
    pub label: &'static str,
    pub route: Route,
}

pub fn nav_links(user: Option<&User>) -> Vec<NavLink> {
    let Some(user) = user else {
        return vec![
            NavLink { label: "Login", route: Route::Login },
            NavLink { label: "Register", route: Route::Register },
        ];
    };

    let mut links = vec![NavLink { label: "Medicines", route: Route::Medicines }];
    match user.role {
        UserRole::Customer => {
            links.push(NavLink { label: "Cart", route: Route::Cart });
            links.push(NavLink { label: "My Orders", route: Route::Orders });
            links.push(NavLink { label: "Prescriptions", route: Route::Prescriptions });
        }
        UserRole::PharmacyAdmin | UserRole::SystemAdmin => {
            links.push(NavLink { label: "Dashboard", route: Route::Admin });
            links.push(NavLink { label: "Manage Orders", route: Route::AdminOrders });
        }
        UserRole::DeliveryPartner => {
            links.push(NavLink { label: "My Deliveries", route: Route::MyDeliveries });
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> User {
        serde_json::from_value(serde_json::json!({
            "id": 1, "email": "a@example.com", "phone": "1", "full_name": "A", "role": role
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_paths() {
        assert_eq!(Route::parse("/"), Some(Route::Medicines));
        assert_eq!(Route::parse("/orders/42"), Some(Route::OrderDetail(42)));
        assert_eq!(Route::parse("/admin/orders/"), Some(Route::AdminOrders));
        assert_eq!(Route::parse("/orders/abc"), None);
        assert_eq!(Route::parse("/nowhere"), None);
        assert_eq!(Route::OrderDetail(42).path(), "/orders/42");
    }

    #[test]
    fn test_guard_by_role() {
        let customer = user("customer");
        let admin = user("pharmacy_admin");
        let partner = user("delivery_partner");

        assert_eq!(guard(Route::Login, None), Access::Allow);
        assert_eq!(guard(Route::Orders, None), Access::RedirectToLogin);
        assert_eq!(guard(Route::Orders, Some(&customer)), Access::Allow);
        assert_eq!(guard(Route::AdminOrders, Some(&customer)), Access::Forbidden);
        assert_eq!(guard(Route::AdminOrders, Some(&admin)), Access::Allow);
        assert_eq!(guard(Route::Admin, Some(&user("system_admin"))), Access::Allow);
        assert_eq!(guard(Route::MyDeliveries, Some(&admin)), Access::Forbidden);
        assert_eq!(guard(Route::MyDeliveries, Some(&partner)), Access::Allow);
    }

    #[test]
    fn test_nav_links_follow_role() {
        let labels = |user: Option<&User>| -> Vec<&'static str> {
            nav_links(user).into_iter().map(|l| l.label).collect()
        };
        assert_eq!(labels(None), ["Login", "Register"]);
        assert!(labels(Some(&user("customer"))).contains(&"Cart"));
        assert!(labels(Some(&user("system_admin"))).contains(&"Manage Orders"));
        assert_eq!(labels(Some(&user("delivery_partner"))), ["Medicines", "My Deliveries"]);
    }
}
