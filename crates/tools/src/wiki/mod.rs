//! Wiki: spaces, pages, versions, smart links, permissions.

pub mod hierarchy;
pub mod links;
pub mod pages;
pub mod permissions;
pub mod versions;

use crate::Tool;
use std::sync::Arc;

pub(crate) const SPACES: &str = "spaces";
pub(crate) const PAGES: &str = "pages";
pub(crate) const USERS: &str = "users";
pub(crate) const PAGE_VERSIONS: &str = "page_versions";
pub(crate) const PAGE_VERSION_COMPONENTS: &str = "page_version_components";
pub(crate) const WHITEBOARDS: &str = "whiteboards";
pub(crate) const SMART_LINKS: &str = "smart_links";
pub(crate) const DATABASES: &str = "databases";
pub(crate) const PERMISSIONS: &str = "permissions";

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(pages::EstablishPageTool),
        Arc::new(pages::EditPageTool),
        Arc::new(pages::RemovePageTool),
        Arc::new(pages::RetrievePageTool),
        Arc::new(pages::RetrieveSpaceTool),
        Arc::new(versions::MakePageVersionTool),
        Arc::new(versions::FetchVersionsTool),
        Arc::new(versions::DeletePageVersionTool),
        Arc::new(links::CreateSmartLinkTool),
        Arc::new(permissions::LookupPermissionsTool),
        Arc::new(permissions::GetPermissionsTool),
        Arc::new(hierarchy::GetPageHierarchyTool),
    ]
}

#[cfg(test)]
pub(crate) mod fixtures {
    use opsdesk_core::Store;
    use serde_json::json;

    /// Engineering space with a three-level page tree, plus an archived legacy space.
    ///
    /// ```text
    /// 1 Home
    /// ├── 2 Runbooks
    /// │   └── 3 Database Failover
    /// └── 5 Security Policy (locked)
    /// 4 Old Notes (space 2, archived)
    /// ```
    pub fn store() -> Store {
        Store::from_value(json!({
            "users": {
                "1": {"user_id": "1", "display_name": "Alice"},
                "2": {"user_id": "2", "display_name": "Bob"}
            },
            "spaces": {
                "1": {"space_id": "1", "space_key": "ENG", "name": "Engineering", "description": "Team handbook",
                      "type": "global", "status": "current", "created_by": "1",
                      "created_at": "2025-01-05T10:00:00", "updated_at": "2025-06-01T10:00:00"},
                "2": {"space_id": "2", "space_key": "OLD", "name": "Legacy Archive", "description": null,
                      "type": "personal", "status": "archived", "created_by": "2",
                      "created_at": "2023-02-01T10:00:00", "updated_at": "2024-02-01T10:00:00"}
            },
            "pages": {
                "1": {"page_id": "1", "title": "Home", "space_id": "1", "parent_page_id": null,
                      "body_storage": "<p>Welcome</p>", "status": "current", "created_by": "1",
                      "created_at": "2025-01-05T10:00:00", "updated_by": "1", "updated_at": "2025-01-05T10:00:00"},
                "2": {"page_id": "2", "title": "Runbooks", "space_id": "1", "parent_page_id": "1",
                      "body_storage": "", "status": "current", "created_by": "1",
                      "created_at": "2025-02-01T10:00:00", "updated_by": "1", "updated_at": "2025-02-01T10:00:00"},
                "3": {"page_id": "3", "title": "Database Failover", "space_id": "1", "parent_page_id": "2",
                      "body_storage": "<ol><li>Promote replica</li></ol>", "status": "current", "created_by": "2",
                      "created_at": "2025-03-01T10:00:00", "updated_by": "2", "updated_at": "2025-03-01T10:00:00"},
                "4": {"page_id": "4", "title": "Old Notes", "space_id": "2", "parent_page_id": null,
                      "body_storage": "", "status": "archived", "created_by": "2",
                      "created_at": "2023-02-01T10:00:00", "updated_by": "2", "updated_at": "2023-02-01T10:00:00"},
                "5": {"page_id": "5", "title": "Security Policy", "space_id": "1", "parent_page_id": "1",
                      "body_storage": "", "status": "locked", "created_by": "1",
                      "created_at": "2025-04-01T10:00:00", "updated_by": "1", "updated_at": "2025-04-01T10:00:00"}
            },
            "page_versions": {
                "1": {"page_version_id": "1", "page_id": "2", "version_number": 1, "title": "Runbooks",
                      "body_storage": "", "created_at": "2025-02-01T10:00:00"}
            },
            "page_version_components": {},
            "whiteboards": {
                "1": {"whiteboard_id": "1", "host_page_id": "3", "content": "[{\"shape\":\"box\"}]", "status": "current"}
            },
            "smart_links": {
                "1": {"smart_link_id": "1", "title": "Dashboard", "url": "https://grafana.test/d/1",
                      "host_page_id": "3", "target_type": "external", "target_id": "ext-1"}
            },
            "databases": {
                "1": {"database_id": "1", "title": "Inventory"}
            },
            "permissions": {
                "1": {"permission_id": "1", "user_id": "2", "content_type": "space", "content_id": "1", "operation": "read"},
                "2": {"permission_id": "2", "user_id": "2", "content_type": "page", "content_id": "2", "operation": "update"},
                "3": {"permission_id": "3", "user_id": "2", "content_type": "page", "content_id": "3", "operation": "read"},
                "4": {"permission_id": "4", "user_id": "1", "content_type": "space", "content_id": "1", "operation": "administer"}
            }
        }))
        .expect("fixture store")
    }
}
