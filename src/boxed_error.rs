/// Wrap an error kind `FooKind` as `Foo(Box<FooKind>)`, so that the
/// `Result` carrying it stays one pointer wide. `Deref` gives access to
/// the kind, `From` forwards to the kind's `From` impls (thus
/// `#[from]` on the kind keeps working).
#[macro_export]
macro_rules! def_boxed_error {
    ($wrappername:ident, $kindname:ident) => {

        #[derive(Debug)]
        pub struct $wrappername(Box<$kindname>);

        impl $wrappername {
            pub fn kind(&self) -> &$kindname {
                &*self.0
            }
            pub fn into_kind(self) -> $kindname {
                *self.0
            }
        }

        impl std::ops::Deref for $wrappername {
            type Target = $kindname;

            fn deref(&self) -> &Self::Target {
                &*self.0
            }
        }

        impl std::ops::DerefMut for $wrappername {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut *self.0
            }
        }

        impl<E> From<E> for $wrappername where $kindname: From<E> {
            fn from(err: E) -> Self {
                $wrappername(Box::new($kindname::from(err)))
            }
        }

        impl std::error::Error for $wrappername {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                self.0.source()
            }
        }

        impl std::fmt::Display for $wrappername {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // method call syntax would be ambiguous here
                std::fmt::Display::fmt(&*self.0, f)
            }
        }
    }
}


/// Define the kind type (deriving `thiserror::Error`) and its box
/// wrapper in one go. The kind definition may be preceded by `pub`
/// etc.
#[macro_export]
macro_rules! def_boxed_thiserror {
    ($wrappername:ident, $key1:tt $kindname:ident {$($body:tt)*}) => {
        $crate::_def_boxed_thiserror!($wrappername, $kindname, $key1 $kindname {
            $($body)*
        });
    };
    ($wrappername:ident, $key1:tt $key2:tt $kindname:ident {$($body:tt)*}) => {
        $crate::_def_boxed_thiserror!($wrappername, $kindname, $key1 $key2 $kindname {
            $($body)*
        });
    };
    ($wrappername:ident, $key1:tt $key2:tt $key3:tt $kindname:ident {$($body:tt)*}) => {
        $crate::_def_boxed_thiserror!($wrappername, $kindname, $key1 $key2 $key3 $kindname {
            $($body)*
        });
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! _def_boxed_thiserror {
    (
        $wrappername:ident,
        $kindname:ident,
        $($innerdef:tt)*
    ) => {
        #[derive(thiserror::Error, Debug)]
        $($innerdef)*

        $crate::def_boxed_error!($wrappername, $kindname);
    }
}
