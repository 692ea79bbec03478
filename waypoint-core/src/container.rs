//! 组件容器
//!
//! 按类型注册工厂、按类型解析实例。端点实例就是通过这里解析的，
//! 分发器只依赖 `resolve(type) -> instance` 这一个能力。

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{ContainerError, ContainerResult};

/// 组件作用域
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scope {
    /// 容器中只有一个实例，首次解析时创建
    #[default]
    Singleton,

    /// 每次解析都创建新实例
    Prototype,
}

pub type SharedComponent = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Container) -> anyhow::Result<SharedComponent> + Send + Sync>;

struct Definition {
    type_name: &'static str,
    scope: Scope,
    factory: Factory,
    instance: Mutex<Option<SharedComponent>>,
}

thread_local! {
    /// 当前线程正在创建的组件，用于发现工厂之间的循环依赖
    static CREATING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// 类型索引的组件容器
#[derive(Default)]
pub struct Container {
    definitions: RwLock<HashMap<TypeId, Arc<Definition>>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let definitions = self.definitions.read();
        f.debug_struct("Container")
            .field(
                "components",
                &definitions.values().map(|d| d.type_name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册单例工厂
    pub fn register_singleton<T, F>(&self, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register::<T, F>(Scope::Singleton, factory)
    }

    /// 注册原型工厂
    pub fn register_prototype<T, F>(&self, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register::<T, F>(Scope::Prototype, factory)
    }

    /// 注册一个已经构造好的实例
    pub fn register_instance<T>(&self, instance: T) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
    {
        let shared: SharedComponent = Arc::new(instance);
        self.insert(
            TypeId::of::<T>(),
            Definition {
                type_name: std::any::type_name::<T>(),
                scope: Scope::Singleton,
                factory: {
                    let shared = Arc::clone(&shared);
                    Arc::new(move |_| Ok(Arc::clone(&shared)))
                },
                instance: Mutex::new(Some(shared)),
            },
        )
    }

    pub fn register<T, F>(&self, scope: Scope, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |container| {
            factory(container).map(|value| Arc::new(value) as SharedComponent)
        });

        self.insert(
            TypeId::of::<T>(),
            Definition {
                type_name: std::any::type_name::<T>(),
                scope,
                factory,
                instance: Mutex::new(None),
            },
        )
    }

    fn insert(&self, type_id: TypeId, definition: Definition) -> ContainerResult<()> {
        let mut definitions = self.definitions.write();
        if let Some(existing) = definitions.get(&type_id) {
            return Err(ContainerError::AlreadyRegistered {
                type_name: existing.type_name.to_string(),
            });
        }
        tracing::debug!(
            component = definition.type_name,
            scope = ?definition.scope,
            "Component registered"
        );
        definitions.insert(type_id, Arc::new(definition));
        Ok(())
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.definitions.read().contains_key(&type_id)
    }

    pub fn contains_type<T: Any>(&self) -> bool {
        self.contains(TypeId::of::<T>())
    }

    /// 按类型解析
    pub fn get<T>(&self) -> ContainerResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get_any(TypeId::of::<T>(), std::any::type_name::<T>())?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    /// 按 `TypeId` 解析为类型擦除的实例
    pub fn get_any(&self, type_id: TypeId, type_name: &str) -> ContainerResult<SharedComponent> {
        // 先拿到定义再释放读锁，工厂内部可能会继续解析其他组件
        let definition = self
            .definitions
            .read()
            .get(&type_id)
            .cloned()
            .ok_or_else(|| ContainerError::NotRegistered {
                type_name: type_name.to_string(),
            })?;

        match definition.scope {
            Scope::Prototype => self.create(type_id, &definition),
            Scope::Singleton => {
                if let Some(instance) = definition.instance.lock().as_ref() {
                    return Ok(Arc::clone(instance));
                }
                let created = self.create(type_id, &definition)?;
                let mut slot = definition.instance.lock();
                Ok(Arc::clone(slot.get_or_insert(created)))
            }
        }
    }

    fn create(&self, type_id: TypeId, definition: &Definition) -> ContainerResult<SharedComponent> {
        let cyclic = CREATING.with(|creating| {
            let mut creating = creating.borrow_mut();
            if creating.contains(&type_id) {
                true
            } else {
                creating.push(type_id);
                false
            }
        });
        if cyclic {
            return Err(ContainerError::CircularDependency {
                type_name: definition.type_name.to_string(),
            });
        }

        let result = (definition.factory)(self);

        CREATING.with(|creating| {
            creating.borrow_mut().retain(|id| *id != type_id);
        });

        result.map_err(|source| ContainerError::Factory {
            type_name: definition.type_name.to_string(),
            source,
        })
    }
}
