// Control method name constants: derived from contracts/control-methods.json.

// ── Server ─────────────────────────────────────────────────────────
pub const PING: &str = "ping";
pub const SHUTDOWN: &str = "shutdown";

// ── Layout ─────────────────────────────────────────────────────────
pub const OPEN_LAYOUT: &str = "open_layout";
pub const LOAD_GDS: &str = "load_gds";
pub const GET_CELL_LIST: &str = "get_cell_list";
pub const EXPORT_GDS: &str = "export_gds";

// ── Selection ──────────────────────────────────────────────────────
pub const SUBSCRIBE_SELECTION: &str = "subscribe_selection";
pub const UNSUBSCRIBE_SELECTION: &str = "unsubscribe_selection";

/// All methods the server dispatches.
pub const IMPLEMENTED_METHODS: &[&str] = &[
    PING,
    SHUTDOWN,
    OPEN_LAYOUT,
    LOAD_GDS,
    GET_CELL_LIST,
    EXPORT_GDS,
    SUBSCRIBE_SELECTION,
    UNSUBSCRIBE_SELECTION,
];

/// A method name resolved against the fixed registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Ping,
    Shutdown,
    OpenLayout,
    LoadGds,
    GetCellList,
    ExportGds,
    SubscribeSelection,
    UnsubscribeSelection,
}

impl Method {
    pub fn from_name(name: &str) -> Option<Self> {
        let method = match name {
            PING => Self::Ping,
            SHUTDOWN => Self::Shutdown,
            OPEN_LAYOUT => Self::OpenLayout,
            LOAD_GDS => Self::LoadGds,
            GET_CELL_LIST => Self::GetCellList,
            EXPORT_GDS => Self::ExportGds,
            SUBSCRIBE_SELECTION => Self::SubscribeSelection,
            UNSUBSCRIBE_SELECTION => Self::UnsubscribeSelection,
            _ => return None,
        };
        Some(method)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ping => PING,
            Self::Shutdown => SHUTDOWN,
            Self::OpenLayout => OPEN_LAYOUT,
            Self::LoadGds => LOAD_GDS,
            Self::GetCellList => GET_CELL_LIST,
            Self::ExportGds => EXPORT_GDS,
            Self::SubscribeSelection => SUBSCRIBE_SELECTION,
            Self::UnsubscribeSelection => UNSUBSCRIBE_SELECTION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_implemented_method_resolves_to_itself() {
        for name in IMPLEMENTED_METHODS {
            let method = Method::from_name(name).expect("implemented method should resolve");
            assert_eq!(method.name(), *name);
        }
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        assert_eq!(Method::from_name("rpc.ping"), None);
        assert_eq!(Method::from_name("PING"), None);
        assert_eq!(Method::from_name(""), None);
    }
}
