//! `remote_class!`: stubs tipados por clase remota, con un conjunto fijo de
//! métodos verificado en compilación.
//!
//! ```ignore
//! remote_class! {
//!     /// Inventario del lado JVM.
//!     pub struct Inventory = "io.sagaflow.demo.Inventory" {
//!         new(warehouse: String);
//!         static fn default_capacity() -> i64 = "defaultCapacity";
//!         fn reserve(&self, sku: String, qty: u32) -> String;
//!         fn available(&self, sku: String) -> i64;
//!     }
//! }
//!
//! let inv = Inventory::new(&client, "north".into()).await?;
//! let reservation = inv.reserve("A-1".into(), 2).await?;
//! ```
//!
//! El nombre remoto por defecto es el del identificador Rust; `= "..."`
//! lo sustituye.

#[doc(hidden)]
#[macro_export]
macro_rules! __remote_method_name {
    ($ident:ident) => {
        stringify!($ident)
    };
    ($ident:ident $name:literal) => {
        $name
    };
}

#[macro_export]
macro_rules! remote_class {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident = $class:literal {
            $( new ( $($cp:ident : $cty:ty),* $(,)? ) ; )?
            $( static fn $sm:ident ( $($sp:ident : $sty:ty),* $(,)? ) -> $sret:ty $(= $sname:literal)? ; )*
            $( fn $im:ident ( &self $(, $ip:ident : $ity:ty)* $(,)? ) -> $iret:ty $(= $iname:literal)? ; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        $vis struct $name {
            proxy: $crate::InstanceProxy,
        }

        #[allow(dead_code)]
        impl $name {
            pub const CLASS: &'static str = $class;

            /// Envuelve un proxy existente (no verifica la clase remota).
            pub fn attach(proxy: $crate::InstanceProxy) -> Self {
                Self { proxy }
            }

            pub fn proxy(&self) -> &$crate::InstanceProxy {
                &self.proxy
            }

            pub fn handle(&self) -> &$crate::bridge_core::RemoteHandle {
                self.proxy.handle()
            }

            $(
                pub async fn new(client: &$crate::BridgeClient $(, $cp: $cty)*)
                                 -> ::std::result::Result<Self, $crate::bridge_core::BridgeError> {
                    let proxy = client.construct(Self::CLASS, $crate::bridge_core::wire_args![$($cp),*]).await?;
                    Ok(Self { proxy })
                }
            )?

            $(
                pub async fn $sm(client: &$crate::BridgeClient $(, $sp: $sty)*)
                                 -> ::std::result::Result<$sret, $crate::bridge_core::BridgeError> {
                    client.call_static_as(Self::CLASS,
                                          $crate::__remote_method_name!($sm $($sname)?),
                                          $crate::bridge_core::wire_args![$($sp),*])
                          .await
                }
            )*

            $(
                pub async fn $im(&self $(, $ip: $ity)*)
                                 -> ::std::result::Result<$iret, $crate::bridge_core::BridgeError> {
                    self.proxy
                        .call_as($crate::__remote_method_name!($im $($iname)?),
                                 $crate::bridge_core::wire_args![$($ip),*])
                        .await
                }
            )*
        }
    };
}
