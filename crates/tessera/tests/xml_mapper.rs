//! Mapper and configuration documents end to end: includes, fragments,
//! cache-ref forward references, the shared second-level cache, key
//! generation, and the configuration document surface.

use std::sync::Arc;

use tessera::testing::StubDriver;
use tessera::{SessionFactory, Value, ValueObject};
use tessera_core::Configuration;
use tessera_sql::{ConfigBuilder, MapperBuilder, MapperDocumentBuilder, Resources, SelectKeySpec, StatementOptions};

fn object(pairs: &[(&str, Value)]) -> Value {
    let mut map = ValueObject::new();
    for (name, value) in pairs {
        map.insert(name.to_string(), value.clone());
    }
    Value::Object(map)
}

fn factory(driver: &StubDriver, build: impl FnOnce(&mut Configuration)) -> SessionFactory {
    let mut config = tessera_sql::configuration();
    config.set_environment(driver.environment("test"));
    build(&mut config);
    config.resolve_pending().unwrap();
    SessionFactory::new(config)
}

#[test]
fn include_expands_fragments_with_properties() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT a, b, c FROM t",
        &["a", "b", "c"],
        vec![vec![Value::Long(1), Value::Long(2), Value::Long(3)]],
    );
    let factory = factory(&driver, |config| {
        MapperDocumentBuilder::new("fragment-mapper.xml")
            .parse(
                config,
                r#"<mapper namespace="app.M">
                     <sql id="cols">a, b, ${x}</sql>
                     <select id="all" resultType="map">
                       SELECT <include refid="cols"><property name="x" value="c"/></include> FROM t
                     </select>
                   </mapper>"#,
            )
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let rows = session.select_list("app.M.all", Value::Null).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(driver.executed()[0].sql, "SELECT a, b, c FROM t");
}

#[test]
fn set_tag_trims_trailing_comma() {
    let driver = StubDriver::new();
    driver.on_update("UPDATE users SET name = ? WHERE id = ?", 1);
    let factory = factory(&driver, |config| {
        MapperDocumentBuilder::new("set-mapper.xml")
            .parse(
                config,
                r#"<mapper namespace="app.M">
                     <update id="patch">
                       UPDATE users
                       <set>
                         <if test="name != null">name = #{name},</if>
                         <if test="age != null">age = #{age},</if>
                       </set>
                       WHERE id = #{id}
                     </update>
                   </mapper>"#,
            )
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let mut parameter = object(&[
        ("id", Value::Long(7)),
        ("name", Value::String("ann".into())),
    ]);
    let count = session.update("app.M.patch", &mut parameter).unwrap();
    assert_eq!(count, 1);
    assert_eq!(
        driver.executed()[0].parameters,
        vec![Value::String("ann".into()), Value::Long(7)]
    );
}

const CACHED_MAPPER: &str = r#"
<mapper namespace="app.CachedMapper">
  <cache size="16"/>
  <select id="findById" resultType="map" useCache="true">
    SELECT * FROM cached WHERE id = #{id}
  </select>
</mapper>
"#;

#[test]
fn second_level_cache_survives_sessions_after_commit() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM cached WHERE id = ?",
        &["id"],
        vec![vec![Value::Long(1)]],
    );
    let factory = factory(&driver, |config| {
        MapperDocumentBuilder::new("cached-mapper.xml")
            .parse(config, CACHED_MAPPER)
            .unwrap();
    });

    {
        let mut session = factory.open().unwrap();
        session
            .select_one("app.CachedMapper.findById", object(&[("id", Value::Long(1))]))
            .unwrap();
        // publish the staged entries to the shared region
        session.commit_force(true).unwrap();
    }
    assert_eq!(driver.executed().len(), 1);

    {
        let mut session = factory.open().unwrap();
        let row = session
            .select_one("app.CachedMapper.findById", object(&[("id", Value::Long(1))]))
            .unwrap()
            .unwrap();
        assert_eq!(row.property("id"), Some(Value::Long(1)));
    }
    // the second session was served from the shared region
    assert_eq!(driver.executed().len(), 1);
}

#[test]
fn cache_ref_forward_reference_resolves_at_fixpoint() {
    let driver = StubDriver::new();
    driver.on_query("SELECT 1", &["one"], vec![vec![Value::Long(1)]]);

    let factory = factory(&driver, |config| {
        // refers to app.Owner before it exists
        MapperDocumentBuilder::new("borrower.xml")
            .parse(
                config,
                r#"<mapper namespace="app.Borrower">
                     <cache-ref namespace="app.Owner"/>
                     <select id="one" resultType="map">SELECT 1</select>
                   </mapper>"#,
            )
            .unwrap();
        assert!(!config.has_mapped_statement("app.Borrower.one"));

        MapperDocumentBuilder::new("owner.xml")
            .parse(
                config,
                r#"<mapper namespace="app.Owner">
                     <cache/>
                   </mapper>"#,
            )
            .unwrap();
    });

    // after the fixpoint the deferred statement exists and runs
    let mut session = factory.open().unwrap();
    let rows = session.select_list("app.Borrower.one", Value::Null).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn unresolved_references_fail_the_build() {
    let mut config = tessera_sql::configuration();
    MapperDocumentBuilder::new("borrower.xml")
        .parse(
            &mut config,
            r#"<mapper namespace="app.Borrower">
                 <cache-ref namespace="app.Ghost"/>
                 <select id="one" resultType="map">SELECT 1</select>
               </mapper>"#,
        )
        .unwrap();

    let err = config.resolve_pending().unwrap_err();
    assert!(err.is_parse());
    assert!(err.to_string().contains("app.Ghost"));
}

#[test]
fn generated_keys_write_back_into_the_parameter() {
    let driver = StubDriver::new();
    driver.on_update_with_keys(
        "INSERT INTO users (name) VALUES (?)",
        1,
        &["id"],
        vec![vec![Value::Long(42)]],
    );
    let factory = factory(&driver, |config| {
        MapperDocumentBuilder::new("keyed.xml")
            .parse(
                config,
                r#"<mapper namespace="app.M">
                     <insert id="add" useGeneratedKeys="true" keyProperty="id">
                       INSERT INTO users (name) VALUES (#{name})
                     </insert>
                   </mapper>"#,
            )
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let mut parameter = object(&[("name", Value::String("ann".into()))]);
    session.insert("app.M.add", &mut parameter).unwrap();

    assert_eq!(parameter.property("id"), Some(Value::Long(42)));
}

#[test]
fn select_key_runs_before_the_insert() {
    let driver = StubDriver::new();
    driver.on_query("SELECT 99", &["id"], vec![vec![Value::Long(99)]]);
    driver.on_update("INSERT INTO t (id) VALUES (?)", 1);
    let factory = factory(&driver, |config| {
        MapperDocumentBuilder::new("select-key.xml")
            .parse(
                config,
                r#"<mapper namespace="app.M">
                     <insert id="add">
                       <selectKey keyProperty="id" resultType="long" order="BEFORE">
                         SELECT 99
                       </selectKey>
                       INSERT INTO t (id) VALUES (#{id})
                     </insert>
                   </mapper>"#,
            )
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let mut parameter = Value::object();
    session.insert("app.M.add", &mut parameter).unwrap();

    assert_eq!(parameter.property("id"), Some(Value::Long(99)));
    let executed = driver.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[0].sql, "SELECT 99");
    assert_eq!(executed[1].parameters, vec![Value::Long(99)]);
}

#[test]
fn select_key_via_the_registration_dsl() {
    let driver = StubDriver::new();
    driver.on_query("SELECT 7", &["id"], vec![vec![Value::Long(7)]]);
    driver.on_update("INSERT INTO t (id) VALUES (?)", 1);
    let factory = factory(&driver, |config| {
        let mut mapper = MapperBuilder::new(config, "app.M");
        mapper
            .insert("add")
            .script("INSERT INTO t (id) VALUES (#{id})")
            .options(StatementOptions {
                key_property: Some("id".to_string()),
                ..StatementOptions::default()
            })
            .select_key(SelectKeySpec {
                statement: "SELECT 7".to_string(),
                key_property: "id".to_string(),
                key_column: None,
                before: true,
                result_type: "long".to_string(),
            })
            .register()
            .unwrap();
    });
    let mut session = factory.open().unwrap();

    let mut parameter = Value::object();
    session.insert("app.M.add", &mut parameter).unwrap();
    assert_eq!(parameter.property("id"), Some(Value::Long(7)));
}

struct MapResources {
    files: Vec<(String, String)>,
}

impl Resources for MapResources {
    fn load(&self, path: &str) -> tessera::Result<String> {
        self.files
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, contents)| contents.clone())
            .ok_or_else(|| tessera::Error::parse(format!("resource `{path}` not found")))
    }
}

#[test]
fn configuration_document_builds_a_working_factory() {
    let driver = StubDriver::new();
    driver.on_query(
        "SELECT * FROM users WHERE id = ?",
        &["id"],
        vec![vec![Value::Long(5)]],
    );

    let mapper_xml = r#"<mapper namespace="app.UserMapper">
         <select id="findById" resultType="map">
           SELECT * FROM ${table} WHERE id = #{id}
         </select>
       </mapper>"#;

    let config = ConfigBuilder::new()
        .resources(Arc::new(MapResources {
            files: vec![("mappers/user.xml".to_string(), mapper_xml.to_string())],
        }))
        .transaction_factory("stub", Arc::new(driver.clone()))
        .data_source("stub", Arc::new(driver.clone()))
        .parse(
            r#"<configuration>
                 <properties>
                   <property name="table" value="users"/>
                 </properties>
                 <settings>
                   <setting name="mapUnderscoreToCamelCase" value="true"/>
                 </settings>
                 <environments default="test">
                   <environment id="test">
                     <transactionManager type="stub"/>
                     <dataSource type="stub"/>
                   </environment>
                 </environments>
                 <mappers>
                   <mapper resource="mappers/user.xml"/>
                 </mappers>
               </configuration>"#,
        )
        .unwrap();

    assert!(config.settings().map_underscore_to_camel_case);

    let factory = SessionFactory::new(config);
    let mut session = factory.open().unwrap();
    let row = session
        .select_one(
            "app.UserMapper.findById",
            object(&[("id", Value::Long(5))]),
        )
        .unwrap()
        .unwrap();
    assert_eq!(row.property("id"), Some(Value::Long(5)));
}
