use std::cell::RefCell;

thread_local! {
    static CURRENT_TENANT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Tenant whose engine is running on this thread, if any.
pub fn current_tenant() -> Option<String> {
    CURRENT_TENANT.with(|slot| slot.borrow().clone())
}

pub(crate) fn with_tenant<R>(tenant: String, operation: impl FnOnce() -> R) -> R {
    let previous = CURRENT_TENANT.with(|slot| slot.replace(Some(tenant)));
    let result = operation();
    CURRENT_TENANT.with(|slot| {
        slot.replace(previous);
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_is_scoped_to_the_operation() {
        assert_eq!(current_tenant(), None);
        let seen = with_tenant("42".to_string(), current_tenant);
        assert_eq!(seen.as_deref(), Some("42"));
        assert_eq!(current_tenant(), None);
    }

    #[test]
    fn nested_scopes_restore_the_outer_tenant() {
        with_tenant("outer".to_string(), || {
            with_tenant("inner".to_string(), || {
                assert_eq!(current_tenant().as_deref(), Some("inner"));
            });
            assert_eq!(current_tenant().as_deref(), Some("outer"));
        });
    }
}
